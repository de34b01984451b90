//! Database layer for docgate
//!
//! Provides SQLite-based storage with:
//! - Chunks, their raw access metadata and embeddings
//! - A partition-pushdown vector index over those chunks
//! - The append-only audit table

mod audit;
mod chunks;
mod import;
mod index;
mod schema;
mod stats;

pub use audit::SqliteAuditSink;
pub use chunks::{bytes_to_embedding, embedding_to_bytes, ChunkRecord};
pub use import::{import_jsonl, ImportStats};
pub use index::SqliteIndex;
pub use schema::Database;
pub use stats::{DatabaseStats, PartitionCount};
use std::path::PathBuf;

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CACHE_DIR_NAME)
            .join("docgate.sqlite")
    }
}
