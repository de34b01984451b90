//! Multi-factor confidence scoring for generated answers
//!
//! Four sub-scores, each within 0.0 - 1.0, are combined with fixed weights.
//! Reported values are on a 0 - 100 scale.

use crate::rerank::token_set;
use crate::response::extract_citations;
use crate::retrieval::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

const WEIGHT_RETRIEVAL: f64 = 0.35;
const WEIGHT_CITATION: f64 = 0.25;
const WEIGHT_COMPLETENESS: f64 = 0.20;
const WEIGHT_CONSISTENCY: f64 = 0.20;

const HIGH_QUALITY_SCORE: f64 = 0.7;

const REFUSAL_PHRASES: &[&str] = &[
    "don't have",
    "do not have",
    "don't know",
    "not available",
    "cannot answer",
    "can't answer",
    "insufficient information",
    "not enough information",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Level for an overall score within 0.0 - 1.0
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceLevel::VeryHigh
        } else if score >= 0.7 {
            ConfidenceLevel::High
        } else if score >= 0.5 {
            ConfidenceLevel::Medium
        } else if score >= 0.3 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryLow => "VERY_LOW",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::VeryHigh => "VERY_HIGH",
        }
    }

    pub fn interpretation(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => {
                "Answer is highly reliable with strong source support and proper citations."
            }
            ConfidenceLevel::High => {
                "Answer is reliable with good source support. Minor improvements possible."
            }
            ConfidenceLevel::Medium => {
                "Answer is moderately reliable. Consider verifying with additional sources."
            }
            ConfidenceLevel::Low => {
                "Answer has limited reliability. Use with caution and verify independently."
            }
            ConfidenceLevel::VeryLow => {
                "Answer has low reliability. Insufficient or inconsistent source support."
            }
        }
    }
}

/// Sub-scores on a 0 - 100 scale
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceComponents {
    pub retrieval_quality: f64,
    pub citation_coverage: f64,
    pub answer_completeness: f64,
    pub source_consistency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    /// 0 - 100
    pub overall: f64,
    pub level: ConfidenceLevel,
    pub components: ConfidenceComponents,
    pub interpretation: String,
    /// Set when [`ConfidenceResult::should_warn`] holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ConfidenceResult {
    /// No evidence at all
    pub fn zero() -> Self {
        let level = ConfidenceLevel::VeryLow;
        Self {
            overall: 0.0,
            level,
            components: ConfidenceComponents::default(),
            interpretation: level.interpretation().to_string(),
            warning: None,
        }
    }

    /// Any one weak signal is enough to warn
    pub fn should_warn(&self) -> bool {
        self.overall < 50.0
            || self.components.retrieval_quality < 40.0
            || self.components.citation_coverage < 30.0
    }

    fn warning_message(&self) -> String {
        let c = &self.components;
        let mut issues = Vec::new();
        if c.retrieval_quality < 50.0 {
            issues.push("low-quality source documents");
        }
        if c.citation_coverage < 40.0 {
            issues.push("insufficient source citations");
        }
        if c.answer_completeness < 50.0 {
            issues.push("potentially incomplete answer");
        }
        if c.source_consistency < 50.0 {
            issues.push("inconsistent sources");
        }

        if issues.is_empty() {
            "This answer has low confidence. Please verify independently.".to_string()
        } else {
            format!(
                "Low confidence due to: {}. Please verify this information.",
                issues.join(", ")
            )
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score an answer against the candidates it was generated from
    pub fn score(&self, answer: &str, candidates: &[Candidate], query: &str) -> ConfidenceResult {
        if candidates.is_empty() {
            let mut result = ConfidenceResult::zero();
            result.warning = Some(result.warning_message());
            return result;
        }

        let relevances: Vec<f64> = candidates.iter().map(Candidate::relevance).collect();

        let retrieval = clamp_unit(retrieval_quality(&relevances));
        let citation = clamp_unit(citation_coverage(answer, candidates));
        let completeness = clamp_unit(answer_completeness(answer, query));
        let consistency = clamp_unit(source_consistency(candidates, &relevances));

        let overall = WEIGHT_RETRIEVAL * retrieval
            + WEIGHT_CITATION * citation
            + WEIGHT_COMPLETENESS * completeness
            + WEIGHT_CONSISTENCY * consistency;

        tracing::debug!(
            retrieval,
            citation,
            completeness,
            consistency,
            overall,
            "Confidence components"
        );

        // Level follows the reported, rounded score
        let overall = percent(overall);
        let level = ConfidenceLevel::from_score(overall / 100.0);
        let mut result = ConfidenceResult {
            overall,
            level,
            components: ConfidenceComponents {
                retrieval_quality: percent(retrieval),
                citation_coverage: percent(citation),
                answer_completeness: percent(completeness),
                source_consistency: percent(consistency),
            },
            interpretation: level.interpretation().to_string(),
            warning: None,
        };
        if result.should_warn() {
            result.warning = Some(result.warning_message());
        }
        result
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// 0.0 - 1.0 → 0 - 100 with two decimals
fn percent(value: f64) -> f64 {
    (value * 10_000.0).round() / 100.0
}

/// Mean normalized relevance plus 0.1 per source above 0.7, bonus capped at 0.3
fn retrieval_quality(relevances: &[f64]) -> f64 {
    if relevances.is_empty() {
        return 0.0;
    }
    let mean = relevances.iter().sum::<f64>() / relevances.len() as f64;
    let high = relevances.iter().filter(|r| **r > HIGH_QUALITY_SCORE).count();
    let bonus = (high as f64 * 0.1).min(0.3);
    (mean + bonus).min(1.0)
}

/// Fraction of candidates cited plus a density bonus up to 0.2
fn citation_coverage(answer: &str, candidates: &[Candidate]) -> f64 {
    let known: HashSet<&str> = candidates.iter().map(Candidate::id).collect();
    let citations = extract_citations(answer, &known);
    if citations.valid.is_empty() {
        return 0.0;
    }

    let coverage = citations.valid.len() as f64 / candidates.len() as f64;
    let sentences = answer
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let density = citations.valid_markers as f64 / sentences as f64;
    (coverage + (density * 0.2).min(0.2)).min(1.0)
}

fn answer_completeness(answer: &str, query: &str) -> f64 {
    let lower = answer.to_lowercase();
    if REFUSAL_PHRASES.iter().any(|p| lower.contains(p)) {
        return 0.6;
    }

    let words = answer.split_whitespace().count();
    if words < 10 {
        return 0.3;
    }

    let length_score = if (20..=200).contains(&words) {
        1.0
    } else if words < 20 {
        words as f64 / 20.0
    } else {
        (1.0 - (words as f64 - 200.0) / 400.0).max(0.7)
    };

    let query_tokens = token_set(query);
    let answer_tokens = token_set(answer);
    let overlap = query_tokens.intersection(&answer_tokens).count() as f64
        / query_tokens.len().max(1) as f64;

    length_score * 0.6 + overlap * 0.4
}

/// Penalize sources scattered across partitions or with widely spread relevance
fn source_consistency(candidates: &[Candidate], relevances: &[f64]) -> f64 {
    if candidates.is_empty() {
        return 0.0;
    }
    if candidates.len() == 1 {
        return 1.0;
    }

    let partitions: BTreeSet<(&str, &str)> = candidates
        .iter()
        .map(|c| {
            (
                c.chunk.access.department.as_str(),
                c.chunk.access.classification.as_str(),
            )
        })
        .collect();
    if partitions.len() == 1 {
        return 1.0;
    }

    let mut consistency = if partitions.len() <= 3 {
        1.0 - (partitions.len() - 1) as f64 * 0.15
    } else {
        0.6
    };

    let max = relevances.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = relevances.iter().cloned().fold(f64::INFINITY, f64::min);
    consistency -= (max - min) * 0.2;

    consistency.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScoreScale;
    use crate::retrieval::{AccessMetadata, Chunk, RelevanceScore};

    fn candidate(id: &str, partition: &str, relevance: f64) -> Candidate {
        let (department, classification) = partition.split_once('/').unwrap();
        let mut c = Candidate::new(
            Chunk {
                id: id.to_string(),
                text: String::new(),
                embedding_ref: None,
                access: AccessMetadata {
                    department: department.to_string(),
                    classification: classification.to_string(),
                    permitted_roles: None,
                },
                source_document: "doc.md".to_string(),
                source_offset: None,
            },
            relevance,
        );
        c.rerank_score = Some(RelevanceScore {
            raw: relevance,
            scale: ScoreScale::Probability,
        });
        c
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(ConfidenceLevel::from_score(0.8), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(0.79), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.5), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.3), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.29), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn test_well_cited_answer_is_high() {
        let candidates = vec![
            candidate("chunk_001", "finance/internal", 0.92),
            candidate("chunk_002", "finance/internal", 0.88),
        ];
        let answer = "Based on the financial reports, Q4 2024 revenue was $5.2M [chunk_001], \
                      representing a 15% increase from Q3 [chunk_001]. Operating expenses decreased \
                      by 8% to $3.1M [chunk_002], resulting in improved profit margins of 22% [chunk_002].";
        let result = ConfidenceScorer::new().score(answer, &candidates, "What was Q4 2024 revenue?");
        assert!(result.overall >= 80.0, "overall {}", result.overall);
        assert_eq!(result.level, ConfidenceLevel::VeryHigh);
        assert_eq!(result.components.citation_coverage, 100.0);
        assert_eq!(result.components.source_consistency, 100.0);
        assert!(!result.should_warn());
        assert!(result.warning.is_none());
    }

    #[test]
    fn test_uncited_answer_warns() {
        let candidates = vec![
            candidate("a", "finance/internal", 0.9),
            candidate("b", "finance/internal", 0.85),
            candidate("c", "finance/internal", 0.8),
        ];
        let answer = "Revenue grew strongly in the fourth quarter thanks to enterprise renewals \
                      and several large new customer contracts signed late in the year.";
        let result = ConfidenceScorer::new().score(answer, &candidates, "What was Q4 revenue?");
        assert!(result.components.citation_coverage < 40.0);
        assert!(result.should_warn());
        assert!(result
            .warning
            .as_deref()
            .unwrap()
            .contains("insufficient source citations"));
    }

    #[test]
    fn test_refusal_scores_above_short_answer() {
        let refusal = answer_completeness("I don't have that.", "q");
        let short = answer_completeness("Revenue rose.", "q");
        assert_eq!(refusal, 0.6);
        assert_eq!(short, 0.3);
    }

    #[test]
    fn test_empty_candidates_are_zero() {
        let result = ConfidenceScorer::new().score("anything", &[], "q");
        assert_eq!(result.overall, 0.0);
        assert_eq!(result.level, ConfidenceLevel::VeryLow);
        assert!(result.should_warn());
    }

    #[test]
    fn test_consistency_degrades_with_partitions() {
        let one = vec![
            candidate("a", "finance/internal", 0.9),
            candidate("b", "finance/internal", 0.5),
        ];
        let rel: Vec<f64> = one.iter().map(Candidate::relevance).collect();
        assert_eq!(source_consistency(&one, &rel), 1.0);

        let two = vec![
            candidate("a", "finance/internal", 0.8),
            candidate("b", "hr/internal", 0.8),
        ];
        let rel: Vec<f64> = two.iter().map(Candidate::relevance).collect();
        assert!((source_consistency(&two, &rel) - 0.85).abs() < 1e-9);

        let many = vec![
            candidate("a", "finance/internal", 1.0),
            candidate("b", "hr/internal", 0.0),
            candidate("c", "general/public", 0.5),
            candidate("d", "marketing/internal", 0.5),
        ];
        let rel: Vec<f64> = many.iter().map(Candidate::relevance).collect();
        assert!((source_consistency(&many, &rel) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_logit_scores_are_squashed() {
        let mut c = candidate("a", "finance/internal", 0.0);
        c.rerank_score = Some(RelevanceScore {
            raw: 8.0,
            scale: ScoreScale::Logit,
        });
        let q = retrieval_quality(&[c.relevance()]);
        assert!(q > 0.99 && q <= 1.0);
    }
}
