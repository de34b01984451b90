//! JSONL chunk import

use super::{ChunkRecord, Database};
use crate::error::{DocGateError, Result};
use crate::llm::Embedder;
use crate::retrieval::Chunk;
use serde::Serialize;
use std::io::BufRead;

const BATCH_SIZE: usize = 32;
const EXTERNAL_MODEL: &str = "external";

/// Import statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportStats {
    pub imported: usize,
    /// Embeddings computed during import
    pub embedded: usize,
    /// Stored, but the access check will always deny them
    pub malformed_metadata: usize,
    /// Lines that could not be parsed or embedded
    pub skipped: usize,
}

/// Import one chunk per line, embedding chunks that carry no embedding
///
/// Without an embedder, chunks lacking an embedding are skipped.
pub async fn import_jsonl<R: BufRead>(
    db: &Database,
    reader: R,
    embedder: Option<&dyn Embedder>,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let mut pending: Vec<Chunk> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ChunkRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", line_no + 1, e);
                stats.skipped += 1;
                continue;
            }
        };

        if let Err(reason) = record.chunk.access.parse() {
            tracing::warn!(
                chunk_id = %record.chunk.id,
                "Importing chunk with malformed access metadata: {}",
                reason
            );
            stats.malformed_metadata += 1;
        }

        match record.embedding {
            Some(embedding) if !embedding.is_empty() => {
                if store(db, &record.chunk, &embedding, EXTERNAL_MODEL)? {
                    stats.imported += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            _ => {
                pending.push(record.chunk);
                if pending.len() >= BATCH_SIZE {
                    embed_and_store(db, &mut pending, embedder, &mut stats).await?;
                }
            }
        }
    }

    embed_and_store(db, &mut pending, embedder, &mut stats).await?;

    tracing::info!(
        imported = stats.imported,
        embedded = stats.embedded,
        skipped = stats.skipped,
        "Chunk import finished"
    );
    Ok(stats)
}

async fn embed_and_store(
    db: &Database,
    pending: &mut Vec<Chunk>,
    embedder: Option<&dyn Embedder>,
    stats: &mut ImportStats,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let batch = std::mem::take(pending);

    let Some(embedder) = embedder else {
        tracing::warn!("{} chunks have no embedding and no embedder is configured", batch.len());
        stats.skipped += batch.len();
        return Ok(());
    };

    let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;

    for (chunk, embedding) in batch.iter().zip(embeddings.iter()) {
        if store(db, chunk, embedding, embedder.model_name())? {
            stats.imported += 1;
            stats.embedded += 1;
        } else {
            stats.skipped += 1;
        }
    }
    if embeddings.len() < batch.len() {
        stats.skipped += batch.len() - embeddings.len();
    }
    Ok(())
}

/// Upsert one chunk; `false` when its embedding was rejected
fn store(db: &Database, chunk: &Chunk, embedding: &[f32], model: &str) -> Result<bool> {
    match db.upsert_chunk(chunk, embedding, model) {
        Ok(()) => Ok(true),
        Err(DocGateError::InvalidEmbedding(reason)) => {
            tracing::warn!(chunk_id = %chunk.id, "Skipping chunk: {}", reason);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    const JSONL: &str = r#"{"id":"fin-001","text":"Q4 revenue was $5.2M","department":"finance","classification":"internal","source_document":"q4.md","embedding":[0.1,0.2]}
{"id":"hr-001","text":"Leave policy","department":"hr","classification":"internal","permitted_roles":"hr_manager","source_document":"policy.md"}

not json
{"id":"bad-001","text":"x","department":"finance","classification":"top-secret","source_document":"x.md","embedding":[1.0,0.5]}
{"id":"wide-001","text":"y","department":"general","classification":"public","source_document":"y.md","embedding":[1.0,0.5,0.25]}
"#;

    #[tokio::test]
    async fn test_import_mixed_file() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let stats = import_jsonl(&db, JSONL.as_bytes(), Some(&LengthEmbedder as &dyn Embedder))
            .await
            .unwrap();
        assert_eq!(stats.imported, 3);
        assert_eq!(stats.embedded, 1);
        // "not json" and the three-dimensional vector
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.malformed_metadata, 1);
        assert_eq!(db.get_chunk("wide-001").unwrap(), None);
        assert_eq!(db.embedding_dimensions().unwrap(), Some(2));

        let hr = db.get_chunk("hr-001").unwrap().unwrap();
        assert_eq!(hr.access.permitted_roles.as_deref(), Some("hr_manager"));
    }

    #[tokio::test]
    async fn test_import_without_embedder_skips_unembedded() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let stats = import_jsonl(&db, JSONL.as_bytes(), None).await.unwrap();
        assert_eq!(stats.imported, 2);
        assert_eq!(stats.skipped, 3);
    }
}
