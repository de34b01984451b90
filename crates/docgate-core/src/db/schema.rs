//! Database schema and initialization

use crate::error::Result;
use crate::rbac::PartitionKey;
use rusqlite::{params, Connection};
use std::path::Path;

/// Chunk and audit store handle
pub struct Database {
    pub(crate) conn: Connection,
}

const SCHEMA_VERSION: i32 = 2;

const CREATE_TABLES: &str = r#"
-- Chunks with raw access metadata and embedding
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    department TEXT NOT NULL,
    classification TEXT NOT NULL,
    -- Canonical department/classification; NULL when the metadata does not parse
    partition_key TEXT,
    permitted_roles TEXT,
    source_document TEXT NOT NULL,
    source_offset INTEGER,
    embedding_ref TEXT,
    embedding BLOB,
    model TEXT,
    created_at TEXT NOT NULL
);

-- Append-only audit trail
CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    username TEXT NOT NULL,
    role TEXT NOT NULL,
    action TEXT NOT NULL,
    query TEXT NOT NULL,
    chunk_ids TEXT NOT NULL,
    decision TEXT NOT NULL,
    detail TEXT
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_audit_correlation ON audit_events(correlation_id);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_events(timestamp);
"#;

const CREATE_TRIGGERS: &str = r#"
-- Audit rows are never rewritten
CREATE TRIGGER IF NOT EXISTS audit_events_no_update
BEFORE UPDATE ON audit_events
BEGIN
    SELECT RAISE(ABORT, 'audit_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_events_no_delete
BEFORE DELETE ON audit_events
BEGIN
    SELECT RAISE(ABORT, 'audit_events is append-only');
END;
"#;

impl Database {
    /// Open database at path, creating if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open and initialize in one step
    pub fn open_initialized(path: impl AsRef<Path>) -> Result<Self> {
        let db = Self::open(path)?;
        db.initialize()?;
        Ok(db)
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        self.conn.execute_batch(CREATE_TABLES)?;
        self.conn.execute_batch(CREATE_TRIGGERS)?;
        self.migrate()?;

        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        Ok(version)
    }

    /// Run migrations to upgrade schema to current version
    pub fn migrate(&self) -> Result<()> {
        let current = self.schema_version()?.unwrap_or(0);

        if current < 2 {
            self.migrate_to_v2()?;
        }

        Ok(())
    }

    fn migrate_to_v2(&self) -> Result<()> {
        let has_partition: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('chunks') WHERE name = 'partition_key'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_partition {
            self.conn
                .execute("ALTER TABLE chunks ADD COLUMN partition_key TEXT", [])?;
        }
        self.conn
            .execute("DROP INDEX IF EXISTS idx_chunks_partition", [])?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_partition ON chunks(partition_key)",
            [],
        )?;

        // Rows written before v2 carry only the raw metadata
        let rows: Vec<(String, String, String)> = {
            let mut stmt = self.conn.prepare(
                "SELECT id, department, classification FROM chunks WHERE partition_key IS NULL",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        for (id, department, classification) in rows {
            if let Ok(key) = PartitionKey::parse(&department, &classification) {
                self.conn.execute(
                    "UPDATE chunks SET partition_key = ?1 WHERE id = ?2",
                    params![key.to_string(), id],
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
        assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_migrate_v1_backfills_partition() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TABLE chunks (
                    id TEXT PRIMARY KEY, text TEXT NOT NULL, department TEXT NOT NULL,
                    classification TEXT NOT NULL, permitted_roles TEXT,
                    source_document TEXT NOT NULL, source_offset INTEGER, embedding_ref TEXT,
                    embedding BLOB, model TEXT, created_at TEXT NOT NULL
                 );
                 CREATE INDEX idx_chunks_partition ON chunks(department, classification);
                 CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
                 INSERT INTO schema_version VALUES (1);
                 INSERT INTO chunks (id, text, department, classification, source_document, created_at)
                 VALUES ('cs-1', 't', 'Customer Support', 'Internal', 'd.md', 'now'),
                        ('bad-1', 't', 'finance', 'top-secret', 'd.md', 'now');",
            )
            .unwrap();

        db.initialize().unwrap();
        assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));

        let partition = |id: &str| -> Option<String> {
            db.conn
                .query_row("SELECT partition_key FROM chunks WHERE id = ?1", [id], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(partition("cs-1").as_deref(), Some("customer_support/internal"));
        assert_eq!(partition("bad-1"), None);
    }

    #[test]
    fn test_audit_table_rejects_updates() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.conn
            .execute(
                "INSERT INTO audit_events (timestamp, correlation_id, username, role, action, query, chunk_ids, decision)
                 VALUES ('t', 'c', 'u', 'r', 'retrieval', 'q', '[]', 'granted')",
                [],
            )
            .unwrap();
        assert!(db
            .conn
            .execute("UPDATE audit_events SET decision = 'denied'", [])
            .is_err());
        assert!(db.conn.execute("DELETE FROM audit_events", []).is_err());
    }
}
