//! Vector index interface and in-memory implementation

use super::Chunk;
use crate::error::{DocGateError, Result};
use crate::rbac::PartitionKey;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

/// One similarity hit returned by an index
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// External vector index collaborator
///
/// `query` receives the caller's accessible partitions. Indexes that report
/// `supports_partition_filter() == false` may ignore them; the retriever
/// then over-fetches and leaves narrowing to the access filter.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(
        &self,
        embedding: &[f32],
        partitions: &[PartitionKey],
        k: usize,
    ) -> Result<Vec<IndexHit>>;

    /// Whether `query` enforces the partition predicate itself
    fn supports_partition_filter(&self) -> bool;

    /// Index name for logs
    fn name(&self) -> &str;
}

/// Compute cosine similarity between two embeddings
///
/// Mismatched lengths, zero vectors and non-finite results score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Rank `(chunk, embedding)` pairs by cosine similarity, keeping the top `k`
pub(crate) fn rank_by_similarity<'a, I>(query: &[f32], entries: I, k: usize) -> Vec<IndexHit>
where
    I: IntoIterator<Item = (&'a Chunk, &'a [f32])>,
{
    let mut hits: Vec<IndexHit> = entries
        .into_iter()
        .map(|(chunk, embedding)| IndexHit {
            chunk: chunk.clone(),
            score: cosine_similarity(query, embedding),
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    hits.truncate(k);
    hits
}

/// Brute-force in-memory index
pub struct MemoryIndex {
    entries: RwLock<Vec<(Chunk, Vec<f32>)>>,
    partition_filter: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            partition_filter: true,
        }
    }

    /// Index that ignores the partition predicate, like a flat ANN store
    pub fn without_partition_filter() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            partition_filter: false,
        }
    }

    /// Add or replace a chunk
    pub fn insert(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DocGateError::Index(format!("memory index lock poisoned: {}", e)))?;
        entries.retain(|(existing, _)| existing.id != chunk.id);
        entries.push((chunk, embedding));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored chunk and embedding
    pub fn entries(&self) -> Vec<(Chunk, Vec<f32>)> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn query(
        &self,
        embedding: &[f32],
        partitions: &[PartitionKey],
        k: usize,
    ) -> Result<Vec<IndexHit>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| DocGateError::Index(format!("memory index lock poisoned: {}", e)))?;

        let allowed: HashSet<&PartitionKey> = partitions.iter().collect();
        let filter = self.partition_filter;

        Ok(rank_by_similarity(
            embedding,
            entries
                .iter()
                .filter(|(chunk, _)| {
                    !filter
                        || chunk
                            .access
                            .partition()
                            .is_some_and(|p| allowed.contains(&p))
                })
                .map(|(chunk, emb)| (chunk, emb.as_slice())),
            k,
        ))
    }

    fn supports_partition_filter(&self) -> bool {
        self.partition_filter
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::AccessMetadata;

    fn chunk(id: &str, partition: &str) -> Chunk {
        let key: PartitionKey = partition.parse().unwrap();
        Chunk {
            id: id.to_string(),
            text: format!("text of {}", id),
            embedding_ref: None,
            access: AccessMetadata::new(&key, &[]),
            source_document: "doc.md".to_string(),
            source_offset: None,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_partition_pushdown() {
        let index = MemoryIndex::new();
        index.insert(chunk("fin", "finance/internal"), vec![1.0, 0.0]).unwrap();
        index.insert(chunk("gen", "general/public"), vec![0.9, 0.1]).unwrap();

        let partitions = vec!["general/public".parse().unwrap()];
        let hits = index.query(&[1.0, 0.0], &partitions, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "gen");

        let none = index.query(&[1.0, 0.0], &[], 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_unfiltered_index_ignores_partitions() {
        let index = MemoryIndex::without_partition_filter();
        index.insert(chunk("fin", "finance/internal"), vec![1.0, 0.0]).unwrap();
        index.insert(chunk("gen", "general/public"), vec![0.0, 1.0]).unwrap();

        let hits = index.query(&[1.0, 0.0], &[], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "fin");
        assert!(!index.supports_partition_filter());
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let index = MemoryIndex::new();
        index.insert(chunk("a", "general/public"), vec![1.0]).unwrap();
        index.insert(chunk("a", "general/public"), vec![0.5]).unwrap();
        assert_eq!(index.len(), 1);
    }
}
