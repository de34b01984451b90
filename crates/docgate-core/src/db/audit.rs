//! Audit event persistence

use super::Database;
use crate::audit::{AuditEvent, AuditSink};
use crate::error::{DocGateError, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::path::Path;
use std::sync::Mutex;

impl Database {
    /// Append one audit event
    pub fn insert_audit_event(&self, event: &AuditEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO audit_events
             (timestamp, correlation_id, username, role, action, query, chunk_ids, decision, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.timestamp.to_rfc3339(),
                event.correlation_id,
                event.username,
                event.role,
                event.action.as_str(),
                event.query,
                serde_json::to_string(&event.chunk_ids_touched)?,
                event.decision.as_str(),
                event.detail
            ],
        )?;
        Ok(())
    }

    /// Most recent events first
    pub fn list_audit_events(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, correlation_id, username, role, action, query, chunk_ids, decision, detail
             FROM audit_events ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(timestamp, correlation_id, username, role, action, query, chunk_ids, decision, detail)| {
                    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                        .map_err(|e| DocGateError::InvalidInput(format!("bad audit timestamp: {}", e)))?
                        .with_timezone(&Utc);
                    Ok(AuditEvent {
                        timestamp,
                        correlation_id,
                        username,
                        role,
                        action: serde_json::from_value(serde_json::Value::String(action))?,
                        query,
                        chunk_ids_touched: serde_json::from_str(&chunk_ids)?,
                        decision: serde_json::from_value(serde_json::Value::String(decision))?,
                        detail,
                    })
                },
            )
            .collect()
    }

    pub fn count_audit_events(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM audit_events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Append-only SQLite audit table
pub struct SqliteAuditSink {
    db: Mutex<Database>,
}

impl SqliteAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (and initialize) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open_initialized(path)?))
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|e| DocGateError::Index(format!("audit store lock poisoned: {}", e)))?;
        db.insert_audit_event(event)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditContext, AuditDecision};

    fn event(decision: AuditDecision) -> AuditEvent {
        AuditContext {
            correlation_id: "abc".to_string(),
            username: "bob".to_string(),
            role: "hr_manager".to_string(),
            query: "leave policy".to_string(),
        }
        .event(AuditAction::AccessCheck, decision)
        .with_chunks(["hr-1", "hr-2"])
    }

    #[test]
    fn test_insert_and_list() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.insert_audit_event(&event(AuditDecision::Granted)).unwrap();
        db.insert_audit_event(&event(AuditDecision::Denied).with_detail("x"))
            .unwrap();

        let events = db.list_audit_events(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].decision, AuditDecision::Denied);
        assert_eq!(events[0].detail.as_deref(), Some("x"));
        assert_eq!(events[1].chunk_ids_touched, vec!["hr-1", "hr-2"]);
        assert_eq!(db.list_audit_events(1).unwrap().len(), 1);
        assert_eq!(db.count_audit_events().unwrap(), 2);
    }

    #[test]
    fn test_sink_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.sqlite");
        let sink = SqliteAuditSink::open(&path).unwrap();
        sink.record(&event(AuditDecision::MalformedMetadata)).unwrap();

        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_audit_events().unwrap(), 1);
    }
}
