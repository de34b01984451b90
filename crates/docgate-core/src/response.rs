//! Citation extraction and the answer envelope

use crate::confidence::ConfidenceResult;
use crate::retrieval::Candidate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const DEFAULT_PREVIEW_CHARS: usize = 200;

lazy_static! {
    static ref CITATION_RE: Regex = Regex::new(r"\[([^\[\]\n]+)\]").unwrap();
}

/// Final outcome reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Ok,
    NoContext,
    LowRelevance,
    RetrievalFailed,
    GenerationFailed,
    Error,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Ok => "ok",
            AnswerStatus::NoContext => "no_context",
            AnswerStatus::LowRelevance => "low_relevance",
            AnswerStatus::RetrievalFailed => "retrieval_failed",
            AnswerStatus::GenerationFailed => "generation_failed",
            AnswerStatus::Error => "error",
        }
    }
}

/// Display metadata for one chunk handed to generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub department: String,
    pub source_file: String,
    /// Normalized relevance, 0.0 - 1.0
    pub relevance_score: f64,
    pub preview: String,
}

/// Response returned from `Ask`; built once, never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub answer: String,
    pub citations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_citations: Vec<String>,
    pub sources: Vec<SourceInfo>,
    pub confidence: ConfidenceResult,
    pub status: AnswerStatus,
    /// Relevance model was unavailable and retrieval order was used
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    /// Opaque id for support lookups; only set on `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AnswerEnvelope {
    /// Envelope with a fixed message and no sources
    pub fn message(status: AnswerStatus, answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            citations: Vec::new(),
            invalid_citations: Vec::new(),
            sources: Vec::new(),
            confidence: ConfidenceResult::zero(),
            status,
            degraded: false,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Citation markers found in an answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Citations {
    /// Distinct ids matching a supplied chunk, in order of first use
    pub valid: Vec<String>,
    /// Distinct markers matching no supplied chunk
    pub invalid: Vec<String>,
    /// Count of valid markers including repeats
    pub valid_markers: usize,
}

/// Find `[id]` and `[id1, id2]` markers; markdown links are skipped
pub fn extract_citations(answer: &str, known_ids: &HashSet<&str>) -> Citations {
    let mut citations = Citations::default();

    for caps in CITATION_RE.captures_iter(answer) {
        let Some(whole) = caps.get(0) else { continue };
        if answer[whole.end()..].starts_with('(') {
            continue;
        }
        let Some(inner) = caps.get(1) else { continue };

        for marker in inner.as_str().split(',').map(str::trim).filter(|m| !m.is_empty()) {
            if known_ids.contains(marker) {
                citations.valid_markers += 1;
                if !citations.valid.iter().any(|v| v == marker) {
                    citations.valid.push(marker.to_string());
                }
            } else if !citations.invalid.iter().any(|v| v == marker) {
                citations.invalid.push(marker.to_string());
            }
        }
    }

    citations
}

/// Cap `text` at `max_chars`, backing off to a word boundary
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let at_boundary = text
        .chars()
        .nth(max_chars)
        .is_some_and(char::is_whitespace);
    let trimmed = match cut.rfind(char::is_whitespace) {
        _ if at_boundary => cut.as_str(),
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}

/// Output of [`ResponseFormatter::format`], before confidence is attached
#[derive(Debug, Clone)]
pub struct FormattedResponse {
    pub answer: String,
    pub citations: Citations,
    pub sources: Vec<SourceInfo>,
    /// Distinct cited sources / total candidates
    pub citation_coverage: f64,
}

impl FormattedResponse {
    pub fn into_envelope(self, confidence: ConfidenceResult, degraded: bool) -> AnswerEnvelope {
        AnswerEnvelope {
            answer: self.answer,
            citations: self.citations.valid,
            invalid_citations: self.citations.invalid,
            sources: self.sources,
            confidence,
            status: AnswerStatus::Ok,
            degraded,
            correlation_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    preview_chars: usize,
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS)
    }
}

impl ResponseFormatter {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    /// Validate citations and describe every candidate; answer text is kept verbatim
    pub fn format(&self, answer_text: &str, candidates: &[Candidate]) -> FormattedResponse {
        let known: HashSet<&str> = candidates.iter().map(|c| c.id()).collect();
        let citations = extract_citations(answer_text, &known);

        if !citations.invalid.is_empty() {
            tracing::debug!(invalid = ?citations.invalid, "Answer cites unknown chunks");
        }

        let citation_coverage = if candidates.is_empty() {
            0.0
        } else {
            citations.valid.len() as f64 / candidates.len() as f64
        };

        let sources = candidates
            .iter()
            .map(|c| SourceInfo {
                id: c.chunk.id.clone(),
                department: c.chunk.access.department.clone(),
                source_file: c.chunk.source_document.clone(),
                relevance_score: (c.relevance() * 10_000.0).round() / 10_000.0,
                preview: preview(&c.chunk.text, self.preview_chars),
            })
            .collect();

        FormattedResponse {
            answer: answer_text.to_string(),
            citations,
            sources,
            citation_coverage,
        }
    }
}
