//! SQLite-backed vector index with partition pushdown

use super::Database;
use crate::error::{DocGateError, Result};
use crate::rbac::PartitionKey;
use crate::retrieval::{IndexHit, VectorIndex};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Embeddings stored as BLOBs; the partition predicate runs in SQL and
/// cosine similarity in Rust
///
/// Each query runs on the blocking pool so callers' deadlines keep ticking
/// while the scan is in progress.
pub struct SqliteIndex {
    db: Arc<Mutex<Database>>,
}

impl SqliteIndex {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open_initialized(path)?))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn query(
        &self,
        embedding: &[f32],
        partitions: &[PartitionKey],
        k: usize,
    ) -> Result<Vec<IndexHit>> {
        let db = Arc::clone(&self.db);
        let embedding = embedding.to_vec();
        let partitions = partitions.to_vec();

        tokio::task::spawn_blocking(move || -> Result<Vec<IndexHit>> {
            let rows = {
                let db = db
                    .lock()
                    .map_err(|e| DocGateError::Index(format!("index lock poisoned: {}", e)))?;
                db.embedded_chunks_in(&partitions)?
            };

            Ok(crate::retrieval::rank_by_similarity(
                &embedding,
                rows.iter().map(|(chunk, emb)| (chunk, emb.as_slice())),
                k,
            ))
        })
        .await
        .map_err(|e| DocGateError::Index(format!("index query task failed: {}", e)))?
    }

    fn supports_partition_filter(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Embedder;
    use crate::retrieval::{AccessMetadata, Chunk, VectorRetriever};
    use std::collections::BTreeSet;
    use std::time::Duration;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "unit"
        }
    }

    fn chunk(id: &str, partition: &str) -> Chunk {
        let key: PartitionKey = partition.parse().unwrap();
        Chunk {
            id: id.to_string(),
            text: id.to_string(),
            embedding_ref: None,
            access: AccessMetadata::new(&key, &[]),
            source_document: "doc.md".to_string(),
            source_offset: None,
        }
    }

    #[tokio::test]
    async fn test_query_respects_partitions() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.upsert_chunk(&chunk("fin", "finance/internal"), &[1.0, 0.0], "m").unwrap();
        db.upsert_chunk(&chunk("gen-a", "general/public"), &[0.6, 0.8], "m").unwrap();
        db.upsert_chunk(&chunk("gen-b", "general/public"), &[0.9, 0.1], "m").unwrap();

        let index = SqliteIndex::new(db);
        let partitions = vec!["general/public".parse().unwrap()];
        let hits = index.query(&[1.0, 0.0], &partitions, 5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["gen-b", "gen-a"]);
        assert!(index.supports_partition_filter());
    }

    #[tokio::test]
    async fn test_busy_connection_does_not_block_retrieval_deadline() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.upsert_chunk(&chunk("gen", "general/public"), &[1.0, 0.0], "m").unwrap();

        let index = Arc::new(SqliteIndex::new(db));
        let connection = Arc::clone(&index.db);
        let retriever = VectorRetriever::new(Arc::new(UnitEmbedder), index)
            .with_timeout(Duration::from_millis(100));
        let partitions: BTreeSet<PartitionKey> = ["general/public".parse().unwrap()].into();

        // A long-running scan holds the connection
        let busy = connection.lock().unwrap();
        let started = std::time::Instant::now();
        let retrieval = retriever.retrieve(&[1.0, 0.0], &partitions, 5).await;
        assert!(retrieval.is_failed());
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(busy);

        let retrieval = retriever.retrieve(&[1.0, 0.0], &partitions, 5).await;
        assert!(!retrieval.is_failed());
        assert_eq!(retrieval.candidates.len(), 1);
    }
}
