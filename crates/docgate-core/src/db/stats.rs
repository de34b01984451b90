//! Database statistics

use super::Database;
use crate::error::Result;
use serde::Serialize;

/// Chunk count for one stored partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionCount {
    pub department: String,
    pub classification: String,
    pub chunks: usize,
}

/// Database stats
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub audit_event_count: usize,
    pub partitions: Vec<PartitionCount>,
}

impl Database {
    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let embedded_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT department, classification, COUNT(*) FROM chunks
             GROUP BY department, classification
             ORDER BY department, classification",
        )?;
        let partitions = stmt
            .query_map([], |row| {
                Ok(PartitionCount {
                    department: row.get(0)?,
                    classification: row.get(1)?,
                    chunks: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DatabaseStats {
            chunk_count: self.count_chunks()?,
            embedded_count: embedded_count as usize,
            audit_event_count: self.count_audit_events()?,
            partitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::PartitionKey;
    use crate::retrieval::{AccessMetadata, Chunk};

    #[test]
    fn test_partition_counts() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        for (id, partition) in [("a", "hr/internal"), ("b", "hr/internal"), ("c", "general/public")] {
            let key: PartitionKey = partition.parse().unwrap();
            let chunk = Chunk {
                id: id.to_string(),
                text: "t".to_string(),
                embedding_ref: None,
                access: AccessMetadata::new(&key, &[]),
                source_document: "d".to_string(),
                source_offset: None,
            };
            db.upsert_chunk(&chunk, &[1.0], "m").unwrap();
        }

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.embedded_count, 3);
        assert_eq!(stats.audit_event_count, 0);
        assert_eq!(
            stats.partitions[1],
            PartitionCount {
                department: "hr".to_string(),
                classification: "internal".to_string(),
                chunks: 2
            }
        );
    }
}
