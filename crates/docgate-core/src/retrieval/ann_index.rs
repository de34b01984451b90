//! HNSW approximate nearest neighbor index for vector search

use super::index::{cosine_similarity, rank_by_similarity};
use super::{Chunk, IndexHit, VectorIndex};
use crate::error::Result;
use crate::rbac::PartitionKey;
use async_trait::async_trait;
use instant_distance::{Builder, HnswMap, Search};

/// Minimum embedding count to justify building an ANN index.
/// Below this threshold, brute-force is fast enough.
const ANN_THRESHOLD: usize = 1000;

/// Wrapper for f32 vectors implementing instant_distance::Point
#[derive(Clone)]
struct EmbeddingPoint {
    values: Vec<f32>,
}

impl instant_distance::Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Cosine distance = 1.0 - cosine_similarity
        1.0 - cosine_similarity(&self.values, &other.values)
    }
}

/// HNSW-backed approximate nearest neighbor index
///
/// The graph spans every partition, so partition predicates cannot be pushed
/// down; callers must over-fetch and filter.
pub struct AnnIndex {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    hnsw: Option<HnswMap<EmbeddingPoint, usize>>,
}

impl AnnIndex {
    /// Build from chunks and their embeddings.
    /// Skips the HNSW graph if fewer than ANN_THRESHOLD embeddings.
    pub fn build(entries: Vec<(Chunk, Vec<f32>)>) -> Self {
        let (chunks, embeddings): (Vec<Chunk>, Vec<Vec<f32>>) = entries.into_iter().unzip();
        let count = chunks.len();

        let hnsw = if count < ANN_THRESHOLD {
            tracing::debug!(
                "Skipping ANN index build: {} embeddings < {} threshold",
                count,
                ANN_THRESHOLD
            );
            None
        } else {
            let points: Vec<EmbeddingPoint> = embeddings
                .iter()
                .map(|values| EmbeddingPoint {
                    values: values.clone(),
                })
                .collect();
            let keys: Vec<usize> = (0..count).collect();
            tracing::info!("Built ANN index with {} embeddings", count);
            Some(Builder::default().build(points, keys))
        };

        Self {
            chunks,
            embeddings,
            hnsw,
        }
    }

    /// Whether the HNSW graph has been built
    pub fn is_built(&self) -> bool {
        self.hnsw.is_some()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn search_graph(&self, map: &HnswMap<EmbeddingPoint, usize>, query: &[f32], k: usize) -> Vec<IndexHit> {
        let query_point = EmbeddingPoint {
            values: query.to_vec(),
        };
        let mut search = Search::default();

        map.search(&query_point, &mut search)
            .take(k)
            .filter_map(|item| {
                let chunk = self.chunks.get(*item.value)?;
                Some(IndexHit {
                    chunk: chunk.clone(),
                    score: 1.0 - item.distance,
                })
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for AnnIndex {
    async fn query(
        &self,
        embedding: &[f32],
        _partitions: &[PartitionKey],
        k: usize,
    ) -> Result<Vec<IndexHit>> {
        Ok(match self.hnsw {
            Some(ref map) => self.search_graph(map, embedding, k),
            None => rank_by_similarity(
                embedding,
                self.chunks
                    .iter()
                    .zip(self.embeddings.iter().map(Vec::as_slice)),
                k,
            ),
        })
    }

    fn supports_partition_filter(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "hnsw"
    }
}
