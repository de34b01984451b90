//! Partition-constrained similarity search

use super::{sort_by_similarity, Candidate, VectorIndex};
use crate::error::{DocGateError, Result};
use crate::llm::Embedder;
use crate::rbac::PartitionKey;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_OVER_FETCH: usize = 5;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of a retrieval attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStatus {
    Ok,
    /// Index or embedding service unavailable, or the embedding was unusable
    Failed,
}

/// Candidates plus how they were obtained
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub candidates: Vec<Candidate>,
    pub status: RetrievalStatus,
    /// The index could not filter by partition and was asked for more hits
    pub over_fetched: bool,
    /// Internal failure detail; never shown to users
    pub failure: Option<String>,
}

impl Retrieval {
    fn ok(candidates: Vec<Candidate>, over_fetched: bool) -> Self {
        Self {
            candidates,
            status: RetrievalStatus::Ok,
            over_fetched,
            failure: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            candidates: Vec::new(),
            status: RetrievalStatus::Failed,
            over_fetched: false,
            failure: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == RetrievalStatus::Failed
    }
}

/// Wraps the embedding model and vector index
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    over_fetch_factor: usize,
    timeout: Duration,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            over_fetch_factor: DEFAULT_OVER_FETCH,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Multiplier applied to `top_k` when the index cannot filter by partition
    pub fn with_over_fetch_factor(mut self, factor: usize) -> Self {
        self.over_fetch_factor = factor.max(1);
        self
    }

    /// Deadline for each embedding and index call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Embed a query, validating the returned vector
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedding = tokio::time::timeout(self.timeout, self.embedder.embed(query))
            .await
            .map_err(|_| DocGateError::Timeout {
                service: "embedder",
                secs: self.timeout.as_secs(),
            })??;
        validate_embedding(&embedding)?;
        Ok(embedding)
    }

    /// Similarity search restricted to `partitions`
    ///
    /// Never returns an error: failures yield an empty `Failed` retrieval.
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        partitions: &BTreeSet<PartitionKey>,
        top_k: usize,
    ) -> Retrieval {
        if let Err(e) = validate_embedding(query_embedding) {
            tracing::warn!("Rejecting query embedding: {}", e);
            return Retrieval::failed(e.to_string());
        }
        if partitions.is_empty() || top_k == 0 {
            return Retrieval::ok(Vec::new(), false);
        }

        let pushdown = self.index.supports_partition_filter();
        let k = if pushdown {
            top_k
        } else {
            top_k.saturating_mul(self.over_fetch_factor)
        };
        let partition_list: Vec<PartitionKey> = partitions.iter().cloned().collect();

        let hits = match tokio::time::timeout(
            self.timeout,
            self.index.query(query_embedding, &partition_list, k),
        )
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                tracing::warn!(index = self.index.name(), "Vector index query failed: {}", e);
                return Retrieval::failed(e.to_string());
            }
            Err(_) => {
                tracing::warn!(
                    index = self.index.name(),
                    "Vector index query timed out after {:?}",
                    self.timeout
                );
                return Retrieval::failed(format!("index timed out after {:?}", self.timeout));
            }
        };

        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .map(|hit| Candidate::new(hit.chunk, f64::from(hit.score)))
            .collect();
        sort_by_similarity(&mut candidates);
        candidates.truncate(k);

        tracing::debug!(
            index = self.index.name(),
            pushdown,
            requested = k,
            returned = candidates.len(),
            "Retrieved candidates"
        );

        Retrieval::ok(candidates, !pushdown)
    }

    /// Embed the query then retrieve; embedding failures become `Failed`
    pub async fn retrieve_for_query(
        &self,
        query: &str,
        partitions: &BTreeSet<PartitionKey>,
        top_k: usize,
    ) -> Retrieval {
        match self.embed_query(query).await {
            Ok(embedding) => self.retrieve(&embedding, partitions, top_k).await,
            Err(e) => {
                tracing::warn!(
                    model = self.embedder.model_name(),
                    "Query embedding failed: {}",
                    e
                );
                Retrieval::failed(e.to_string())
            }
        }
    }

    /// Retrieve once per query variant, keeping each chunk's best similarity
    ///
    /// The first variant decides failure; a failing extra variant is logged
    /// and skipped.
    pub async fn retrieve_for_variants(
        &self,
        variants: &[String],
        partitions: &BTreeSet<PartitionKey>,
        top_k: usize,
    ) -> Retrieval {
        let Some((primary, extra)) = variants.split_first() else {
            return Retrieval::ok(Vec::new(), false);
        };

        let first = self.retrieve_for_query(primary, partitions, top_k).await;
        if first.is_failed() || extra.is_empty() {
            return first;
        }

        let mut limit = first.candidates.len();
        let mut over_fetched = first.over_fetched;
        let mut best: HashMap<String, Candidate> = first
            .candidates
            .into_iter()
            .map(|c| (c.chunk.id.clone(), c))
            .collect();

        for variant in extra {
            let retrieval = self.retrieve_for_query(variant, partitions, top_k).await;
            if retrieval.is_failed() {
                tracing::warn!(
                    variant = %variant,
                    "Skipping query variant: {}",
                    retrieval.failure.as_deref().unwrap_or("retrieval failed")
                );
                continue;
            }
            limit = limit.max(retrieval.candidates.len());
            over_fetched |= retrieval.over_fetched;

            for candidate in retrieval.candidates {
                match best.entry(candidate.chunk.id.clone()) {
                    Entry::Occupied(mut slot) => {
                        if candidate.similarity_score > slot.get().similarity_score {
                            slot.insert(candidate);
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(candidate);
                    }
                }
            }
        }

        let mut candidates: Vec<Candidate> = best.into_values().collect();
        sort_by_similarity(&mut candidates);
        candidates.truncate(limit);
        Retrieval::ok(candidates, over_fetched)
    }
}

fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(DocGateError::InvalidInput("empty embedding".to_string()));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(DocGateError::InvalidInput(
            "embedding contains non-finite values".to_string(),
        ));
    }
    if embedding.iter().all(|v| *v == 0.0) {
        return Err(DocGateError::InvalidInput("zero embedding".to_string()));
    }
    Ok(())
}
