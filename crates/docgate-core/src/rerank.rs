//! Cross-encoder reranking with near-duplicate collapse

use crate::llm::{CrossEncoder, RerankDocument};
use crate::retrieval::{Candidate, RelevanceScore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_DEDUP_THRESHOLD: f64 = 0.95;

/// Result of one rerank pass
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    pub candidates: Vec<Candidate>,
    /// The relevance model was unavailable; input order was kept
    pub degraded: bool,
    /// Ids collapsed into a higher-ranked near-duplicate
    pub duplicates: Vec<String>,
    /// Ids dropped by the relevance floor
    pub below_floor: Vec<String>,
}

pub struct ReRanker {
    encoder: Arc<dyn CrossEncoder>,
    timeout: Duration,
    dedup_threshold: f64,
}

impl ReRanker {
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            encoder,
            timeout: DEFAULT_TIMEOUT,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dedup_threshold(mut self, threshold: f64) -> Self {
        self.dedup_threshold = threshold;
        self
    }

    /// Score, sort, dedup, apply `relevance_floor` (0.0 - 1.0), truncate
    ///
    /// Never fails: when the model errors or times out the input order is
    /// kept, duplicates are still collapsed and no floor is applied.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_k: usize,
        relevance_floor: f64,
    ) -> RerankOutcome {
        if candidates.is_empty() || top_k == 0 {
            return RerankOutcome::default();
        }

        let docs: Vec<RerankDocument> = candidates
            .iter()
            .map(|c| RerankDocument {
                id: c.chunk.id.clone(),
                text: c.chunk.text.clone(),
            })
            .collect();

        let scores = match tokio::time::timeout(self.timeout, self.encoder.score(query, &docs)).await
        {
            Ok(Ok(scores)) if scores.len() == candidates.len() => Some(scores),
            Ok(Ok(scores)) => {
                tracing::warn!(
                    model = self.encoder.model_name(),
                    expected = candidates.len(),
                    got = scores.len(),
                    "Reranker returned wrong number of scores"
                );
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(model = self.encoder.model_name(), "Reranker unavailable: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    model = self.encoder.model_name(),
                    "Reranker timed out after {:?}",
                    self.timeout
                );
                None
            }
        };

        let Some(scores) = scores else {
            let (mut kept, duplicates) = self.dedup(candidates);
            kept.truncate(top_k);
            return RerankOutcome {
                candidates: kept,
                degraded: true,
                duplicates,
                below_floor: Vec::new(),
            };
        };

        let scale = self.encoder.scale();
        let mut scored: Vec<Candidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut candidate, raw)| {
                let raw = if raw.is_nan() { f64::NEG_INFINITY } else { raw };
                candidate.rerank_score = Some(RelevanceScore { raw, scale });
                candidate
            })
            .collect();
        sort_by_rerank_score(&mut scored);

        let (deduped, duplicates) = self.dedup(scored);
        let (mut kept, below): (Vec<Candidate>, Vec<Candidate>) = deduped
            .into_iter()
            .partition(|c| c.relevance() >= relevance_floor);
        kept.truncate(top_k);

        tracing::debug!(
            kept = kept.len(),
            duplicates = duplicates.len(),
            below_floor = below.len(),
            "Reranked candidates"
        );

        RerankOutcome {
            candidates: kept,
            degraded: false,
            duplicates,
            below_floor: below.into_iter().map(|c| c.chunk.id).collect(),
        }
    }

    /// Collapse near-duplicates, keeping the earlier (higher-ranked) one
    fn dedup(&self, candidates: Vec<Candidate>) -> (Vec<Candidate>, Vec<String>) {
        let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
        let mut kept_tokens: Vec<HashSet<String>> = Vec::with_capacity(candidates.len());
        let mut duplicates = Vec::new();

        for candidate in candidates {
            let tokens = token_set(&candidate.chunk.text);
            let is_duplicate = kept_tokens
                .iter()
                .any(|existing| overlap_coefficient(existing, &tokens) >= self.dedup_threshold);
            if is_duplicate {
                duplicates.push(candidate.chunk.id);
            } else {
                kept_tokens.push(tokens);
                kept.push(candidate);
            }
        }

        (kept, duplicates)
    }
}

/// Descending raw rerank score, ties broken by chunk id
pub fn sort_by_rerank_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        let a_score = a.rerank_score.map(|s| s.raw).unwrap_or(f64::NEG_INFINITY);
        let b_score = b.rerank_score.map(|s| s.raw).unwrap_or(f64::NEG_INFINITY);
        b_score
            .partial_cmp(&a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

/// Lowercased alphanumeric word set
pub fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `|A ∩ B| / min(|A|, |B|)`; 0 when either set is empty
pub fn overlap_coefficient(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / smaller as f64
}
