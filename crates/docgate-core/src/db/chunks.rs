//! Chunk storage with embeddings

use super::Database;
use crate::error::{DocGateError, Result};
use crate::rbac::PartitionKey;
use crate::retrieval::{AccessMetadata, Chunk};
use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// One line of a chunk import file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Precomputed embedding; computed at import time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

const CHUNK_COLUMNS: &str =
    "id, text, department, classification, permitted_roles, source_document, source_offset, embedding_ref";

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let offset: Option<i64> = row.get(6)?;
    Ok(Chunk {
        id: row.get(0)?,
        text: row.get(1)?,
        access: AccessMetadata {
            department: row.get(2)?,
            classification: row.get(3)?,
            permitted_roles: row.get(4)?,
        },
        source_document: row.get(5)?,
        source_offset: offset.map(|o| o as u64),
        embedding_ref: row.get(7)?,
    })
}

impl Database {
    /// Insert or replace a chunk and its embedding
    ///
    /// The embedding must be finite and match the dimension of the
    /// embeddings already stored.
    pub fn upsert_chunk(&self, chunk: &Chunk, embedding: &[f32], model: &str) -> Result<()> {
        if chunk.id.trim().is_empty() {
            return Err(DocGateError::InvalidInput("chunk id is empty".to_string()));
        }
        self.check_embedding(&chunk.id, embedding)?;

        let partition_key = chunk.access.partition().map(|key| key.to_string());
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO chunks
             (id, text, department, classification, partition_key, permitted_roles,
              source_document, source_offset, embedding_ref, embedding, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                chunk.id,
                chunk.text,
                chunk.access.department,
                chunk.access.classification,
                partition_key,
                chunk.access.permitted_roles,
                chunk.source_document,
                chunk.source_offset.map(|o| o as i64),
                chunk.embedding_ref,
                embedding_to_bytes(embedding),
                model,
                now
            ],
        )?;
        Ok(())
    }

    fn check_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(DocGateError::InvalidEmbedding(format!("chunk {}: empty vector", id)));
        }
        if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
            return Err(DocGateError::InvalidEmbedding(format!(
                "chunk {}: non-finite value at position {}",
                id, pos
            )));
        }
        if let Some(expected) = self.embedding_dimensions_excluding(id)? {
            if expected != embedding.len() {
                return Err(DocGateError::InvalidEmbedding(format!(
                    "chunk {}: {} dimensions, index holds {}",
                    id,
                    embedding.len(),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Dimension of the stored embeddings, if any are stored
    pub fn embedding_dimensions(&self) -> Result<Option<usize>> {
        self.embedding_dimensions_excluding("")
    }

    fn embedding_dimensions_excluding(&self, id: &str) -> Result<Option<usize>> {
        let bytes: Option<i64> = self
            .conn
            .query_row(
                "SELECT length(embedding) FROM chunks
                 WHERE embedding IS NOT NULL AND id != ?1 LIMIT 1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.map(|b| b as usize / 4))
    }

    pub fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let sql = format!("SELECT {} FROM chunks WHERE id = ?1", CHUNK_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], chunk_from_row)
            .optional()?)
    }

    pub fn count_chunks(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Embedded chunks whose canonical partition is in `partitions`
    ///
    /// Rows whose metadata never parsed have no canonical partition and are
    /// never returned here.
    pub fn embedded_chunks_in(&self, partitions: &[PartitionKey]) -> Result<Vec<(Chunk, Vec<f32>)>> {
        if partitions.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=partitions.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {}, embedding FROM chunks WHERE embedding IS NOT NULL AND partition_key IN ({})",
            CHUNK_COLUMNS, placeholders
        );

        let values: Vec<String> = partitions.iter().map(ToString::to_string).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let chunk = chunk_from_row(row)?;
                let bytes: Vec<u8> = row.get(8)?;
                Ok((chunk, bytes_to_embedding(&bytes)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every embedded chunk, regardless of partition
    pub fn all_embedded_chunks(&self) -> Result<Vec<(Chunk, Vec<f32>)>> {
        let sql = format!(
            "SELECT {}, embedding FROM chunks WHERE embedding IS NOT NULL ORDER BY id",
            CHUNK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let chunk = chunk_from_row(row)?;
                let bytes: Vec<u8> = row.get(8)?;
                Ok((chunk, bytes_to_embedding(&bytes)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Embedding model recorded for stored chunks, if any
    pub fn embedding_model(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT model FROM chunks WHERE model IS NOT NULL LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }
}

/// Convert embedding to little-endian bytes
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert little-endian bytes to embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn chunk(id: &str, department: &str, classification: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: format!("body of {}", id),
            embedding_ref: None,
            access: AccessMetadata {
                department: department.to_string(),
                classification: classification.to_string(),
                permitted_roles: None,
            },
            source_document: "doc.md".to_string(),
            source_offset: Some(42),
        }
    }

    #[test]
    fn test_embedding_bytes() {
        let original = vec![1.0f32, -2.5, 3.25];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&original)), original);
    }

    #[test]
    fn test_upsert_and_get() {
        let db = db();
        let c = chunk("fin-001", "finance", "internal");
        db.upsert_chunk(&c, &[1.0, 0.0], "test-model").unwrap();
        db.upsert_chunk(&c, &[0.0, 1.0], "test-model").unwrap();
        assert_eq!(db.count_chunks().unwrap(), 1);
        assert_eq!(db.get_chunk("fin-001").unwrap(), Some(c));
        assert_eq!(db.get_chunk("missing").unwrap(), None);
        assert_eq!(db.embedding_model().unwrap().as_deref(), Some("test-model"));
    }

    #[test]
    fn test_partition_predicate() {
        let db = db();
        db.upsert_chunk(&chunk("a", "Finance", "internal"), &[1.0], "m").unwrap();
        db.upsert_chunk(&chunk("b", "hr", "internal"), &[1.0], "m").unwrap();
        db.upsert_chunk(&chunk("c", "finance", "restricted"), &[1.0], "m").unwrap();

        let partitions = vec![PartitionKey::parse("finance", "internal").unwrap()];
        let rows = db.embedded_chunks_in(&partitions).unwrap();
        let ids: Vec<&str> = rows.iter().map(|(c, _)| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(db.embedded_chunks_in(&[]).unwrap().is_empty());
        assert_eq!(db.all_embedded_chunks().unwrap().len(), 3);
    }

    #[test]
    fn test_multiword_department_matches_pushdown() {
        let db = db();
        db.upsert_chunk(&chunk("cs-1", "Customer Support", "Internal"), &[1.0], "m")
            .unwrap();
        db.upsert_chunk(&chunk("cs-2", "customer-support", "public"), &[1.0], "m")
            .unwrap();
        db.upsert_chunk(&chunk("cs-3", "customer support", "restricted"), &[1.0], "m")
            .unwrap();

        let granted: PartitionKey = "customer_support/internal".parse().unwrap();
        assert_eq!(
            db.get_chunk("cs-1").unwrap().unwrap().access.partition(),
            Some(granted.clone())
        );

        let partitions = vec![granted, "customer_support/public".parse().unwrap()];
        let rows = db.embedded_chunks_in(&partitions).unwrap();
        let ids: Vec<&str> = rows.iter().map(|(c, _)| c.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"cs-1"));
        assert!(ids.contains(&"cs-2"));
    }

    #[test]
    fn test_malformed_metadata_never_pushed_down() {
        let db = db();
        db.upsert_chunk(&chunk("bad", "finance", "top-secret"), &[1.0], "m").unwrap();
        let partitions: Vec<PartitionKey> = crate::rbac::Classification::ALL
            .iter()
            .map(|c| PartitionKey::new("finance", *c).unwrap())
            .collect();
        assert!(db.embedded_chunks_in(&partitions).unwrap().is_empty());
        assert_eq!(db.all_embedded_chunks().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_embeddings_rejected() {
        let db = db();
        let c = chunk("fin-001", "finance", "internal");
        for bad in [vec![], vec![1.0, f32::NAN], vec![f32::INFINITY, 0.0]] {
            let err = db.upsert_chunk(&c, &bad, "m").unwrap_err();
            assert!(matches!(err, DocGateError::InvalidEmbedding(_)), "{:?}", bad);
        }
        assert_eq!(db.count_chunks().unwrap(), 0);

        db.upsert_chunk(&c, &[1.0, 0.0], "m").unwrap();
        assert_eq!(db.embedding_dimensions().unwrap(), Some(2));
        let other = chunk("fin-002", "finance", "internal");
        assert!(matches!(
            db.upsert_chunk(&other, &[1.0, 0.0, 0.0], "m"),
            Err(DocGateError::InvalidEmbedding(_))
        ));

        // Replacing the only stored vector may change the dimension
        db.upsert_chunk(&c, &[1.0, 0.0, 0.0], "m").unwrap();
        assert_eq!(db.embedding_dimensions().unwrap(), Some(3));
    }

    #[test]
    fn test_empty_id_rejected() {
        let db = db();
        assert!(db.upsert_chunk(&chunk(" ", "hr", "internal"), &[1.0], "m").is_err());
    }
}
