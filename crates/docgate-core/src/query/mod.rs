//! Query normalization ahead of embedding
//!
//! A raw question is lowercased and stripped of punctuation, quarter
//! shorthand is spelled out (`q4` becomes `quarter 4`, `q1-q3` becomes
//! `quarter 1 quarter 2 quarter 3`) and vocabulary abbreviations are
//! expanded. The normalized text is followed by retrieval variants: one
//! without stop words and one made of key terms only.

use crate::error::{DocGateError, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Built-in query vocabulary
pub const DEFAULT_VOCABULARY: &str = include_str!("vocabulary.yml");

lazy_static! {
    static ref QUARTER_RANGE_RE: Regex =
        Regex::new(r"\bq([1-4])\s*(?:-|\bto\b|\bthrough\b)\s*q([1-4])\b").unwrap();
    static ref QUARTER_RE: Regex = Regex::new(r"\bq([1-4])\b").unwrap();
    static ref VERSUS_RE: Regex = Regex::new(r"\bvs\b\.?").unwrap();
}

#[derive(Debug, Deserialize)]
struct RawVocabulary {
    #[serde(default)]
    abbreviations: BTreeMap<String, String>,
    #[serde(default)]
    stop_words: Vec<String>,
    #[serde(default)]
    key_terms: Vec<String>,
}

/// Abbreviations, stop words and key terms used by [`QueryNormalizer`]
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    abbreviations: HashMap<String, String>,
    stop_words: HashSet<String>,
    key_terms: HashSet<String>,
}

impl Vocabulary {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(DEFAULT_VOCABULARY)
    }

    /// Load a vocabulary file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML vocabulary
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawVocabulary = serde_yaml::from_str(content)?;

        let mut abbreviations = HashMap::with_capacity(raw.abbreviations.len());
        for (abbreviation, expansion) in raw.abbreviations {
            let key = abbreviation.trim().to_lowercase();
            if key.is_empty() || !key.chars().all(char::is_alphanumeric) {
                return Err(DocGateError::Config(format!(
                    "abbreviation '{}' must be a single word",
                    abbreviation
                )));
            }
            let expansion = clean(&expansion.to_lowercase());
            if expansion.is_empty() {
                return Err(DocGateError::Config(format!(
                    "abbreviation '{}' has an empty expansion",
                    abbreviation
                )));
            }
            abbreviations.insert(key, expansion);
        }

        let words = |list: Vec<String>| -> HashSet<String> {
            list.iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Ok(Self {
            abbreviations,
            stop_words: words(raw.stop_words),
            key_terms: words(raw.key_terms),
        })
    }

    pub fn abbreviation(&self, word: &str) -> Option<&str> {
        self.abbreviations.get(word).map(String::as_str)
    }
}

/// A normalized question and the texts to retrieve with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub text: String,
    /// `text` first, then distinct non-empty variants
    pub variants: Vec<String>,
}

impl NormalizedQuery {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    vocabulary: Vocabulary,
    max_variants: usize,
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new(Vocabulary::default())
    }
}

impl QueryNormalizer {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            vocabulary,
            max_variants: 1,
        }
    }

    pub fn builtin() -> Result<Self> {
        Ok(Self::new(Vocabulary::builtin()?))
    }

    /// Cap on retrieval texts per question, the normalized text included
    pub fn with_max_variants(mut self, max_variants: usize) -> Self {
        self.max_variants = max_variants.max(1);
        self
    }

    pub fn max_variants(&self) -> usize {
        self.max_variants
    }

    pub fn normalize(&self, raw: &str) -> NormalizedQuery {
        let mut text = raw.to_lowercase();
        text = text
            .replace('&', " and ")
            .replace('%', " percent ")
            .replace('/', " or ");
        text = VERSUS_RE.replace_all(&text, " versus ").into_owned();
        text = QUARTER_RANGE_RE
            .replace_all(&text, |caps: &Captures| expand_quarter_range(caps))
            .into_owned();
        text = clean(&text);
        text = QUARTER_RE.replace_all(&text, "quarter $1").into_owned();

        let text = text
            .split_whitespace()
            .map(|word| self.vocabulary.abbreviation(word).unwrap_or(word))
            .collect::<Vec<_>>()
            .join(" ");

        let mut variants = vec![text.clone()];
        for variant in [self.without_stop_words(&text), self.key_terms(&text)] {
            if !variant.is_empty() && !variants.contains(&variant) {
                variants.push(variant);
            }
        }
        if text.is_empty() {
            variants.clear();
        }
        variants.truncate(self.max_variants);

        NormalizedQuery { text, variants }
    }

    fn without_stop_words(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|w| !self.vocabulary.stop_words.contains(*w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Key terms in order; `quarter N` stays together
    fn key_terms(&self, text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut kept = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let word = words[i];
            let next_is_number = words
                .get(i + 1)
                .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()));
            if word == "quarter" && next_is_number {
                kept.push(format!("quarter {}", words[i + 1]));
                i += 2;
                continue;
            }
            if self.vocabulary.key_terms.contains(word) {
                kept.push(word.to_string());
            }
            i += 1;
        }
        kept.join(" ")
    }
}

fn expand_quarter_range(caps: &Captures) -> String {
    let (Ok(start), Ok(end)) = (caps[1].parse::<u8>(), caps[2].parse::<u8>()) else {
        return caps[0].to_string();
    };
    if start > end {
        return caps[0].to_string();
    }
    (start..=end)
        .map(|q| format!("q{}", q))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop punctuation, keeping decimal points, and collapse whitespace
fn clean(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let decimal_point = c == '.'
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if c.is_alphanumeric() || c == '_' || decimal_point {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> QueryNormalizer {
        QueryNormalizer::builtin().unwrap().with_max_variants(3)
    }

    #[test]
    fn test_builtin_vocabulary_parses() {
        let vocabulary = Vocabulary::builtin().unwrap();
        assert_eq!(vocabulary.abbreviation("yoy"), Some("year over year"));
        assert_eq!(vocabulary.abbreviation("revenue"), None);
    }

    #[test]
    fn test_quarter_shorthand() {
        let n = normalizer();
        assert_eq!(n.normalize("What was Q4 revenue?").text, "what was quarter 4 revenue");
        assert_eq!(
            n.normalize("Revenue Q1-Q3").text,
            "revenue quarter 1 quarter 2 quarter 3"
        );
        assert_eq!(
            n.normalize("costs from q2 to q4").text,
            "costs from quarter 2 quarter 3 quarter 4"
        );
        // Descending ranges are left as two quarters
        assert_eq!(n.normalize("q3-q1").text, "quarter 3 quarter 1");
        // Only q1..q4 are quarters
        assert_eq!(n.normalize("q7 and faq1").text, "q7 and faq1");
    }

    #[test]
    fn test_abbreviations_and_symbols() {
        let n = normalizer();
        assert_eq!(
            n.normalize("YoY growth vs. plan & R/D").text,
            "year over year growth versus plan and r or d"
        );
        assert_eq!(
            n.normalize("ROI of 12.5% in FY").text,
            "return on investment of 12.5 percent in fiscal year"
        );
        // Whole words only
        assert_eq!(n.normalize("canvas yoyo").text, "canvas yoyo");
    }

    #[test]
    fn test_variants() {
        let n = normalizer();
        let query = n.normalize("What is the Q4 revenue policy for interns?");
        assert_eq!(query.text, "what is the quarter 4 revenue policy for interns");
        assert_eq!(
            query.variants,
            vec![
                "what is the quarter 4 revenue policy for interns",
                "quarter 4 revenue policy interns",
                "quarter 4 revenue policy",
            ]
        );

        // Default keeps only the normalized text
        let single = QueryNormalizer::builtin().unwrap().normalize("What is the Q4 revenue?");
        assert_eq!(single.variants, vec!["what is the quarter 4 revenue"]);
    }

    #[test]
    fn test_punctuation_only_query_is_empty() {
        let query = normalizer().normalize("?? -- !!");
        assert!(query.is_empty());
        assert!(query.variants.is_empty());
    }

    #[test]
    fn test_custom_vocabulary() {
        let vocabulary = Vocabulary::from_yaml("abbreviations:\n  opex: operating expenses\n").unwrap();
        let n = QueryNormalizer::new(vocabulary);
        assert_eq!(n.normalize("OPEX in Q2").text, "operating expenses in quarter 2");

        assert!(Vocabulary::from_yaml("abbreviations:\n  \"r&d\": research\n").is_err());
        assert!(Vocabulary::from_yaml("abbreviations:\n  rd: \"  \"\n").is_err());
    }
}
