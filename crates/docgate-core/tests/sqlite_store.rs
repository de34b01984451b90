//! SQLite-backed index and audit log on a real database file

use async_trait::async_trait;
use docgate_core::{
    import_jsonl, AnswerStatus, AskRequest, AuditAction, AuditEmitter, AuditSink, Collaborators,
    Config, CrossEncoder, Database, Embedder, Generator, Orchestrator, RerankDocument, Result,
    RoleResolver, ScoreScale, SqliteAuditSink, SqliteIndex,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Two-dimensional keyword embedding: revenue-ish text vs. everything else
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    if lower.contains("revenue") {
        vec![1.0, 0.1]
    } else {
        vec![0.1, 1.0]
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

struct ConstantEncoder;

#[async_trait]
impl CrossEncoder for ConstantEncoder {
    async fn score(&self, _query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>> {
        Ok(documents.iter().map(|_| 3.0).collect())
    }

    fn scale(&self) -> ScoreScale {
        ScoreScale::Logit
    }

    fn model_name(&self) -> &str {
        "constant"
    }
}

struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, _system: &str, _user: &str, _max_tokens: u32) -> Result<String> {
        Ok("Q4 revenue was $5.2M according to the quarterly report [fin-001].".to_string())
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

const CHUNKS: &str = r#"{"id":"fin-001","text":"Q4 revenue was $5.2M","department":"finance","classification":"internal","source_document":"q4.md"}
{"id":"fin-002","text":"Board pay bands","department":"finance","classification":"confidential","source_document":"board.md"}
{"id":"gen-001","text":"Office hours are 9 to 5","department":"general","classification":"public","source_document":"handbook.md"}
{"id":"hr-001","text":"Revenue share bonus policy","department":"hr","classification":"internal","permitted_roles":"hr_manager","source_document":"bonus.md"}
"#;

async fn seeded_database(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("docgate.sqlite");
    let db = Database::open_initialized(&path).unwrap();
    let stats = import_jsonl(&db, CHUNKS.as_bytes(), Some(&KeywordEmbedder as &dyn Embedder))
        .await
        .unwrap();
    assert_eq!(stats.imported, 4);
    assert_eq!(stats.embedded, 4);
    path
}

#[tokio::test]
async fn test_import_then_ask_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir).await;

    let sink = Arc::new(SqliteAuditSink::open(&path).unwrap());
    let (emitter, worker) = AuditEmitter::spawn(sink as Arc<dyn AuditSink>);

    let orchestrator = Orchestrator::new(
        RoleResolver::builtin().unwrap(),
        Collaborators {
            embedder: Arc::new(KeywordEmbedder),
            index: Arc::new(SqliteIndex::open(&path).unwrap()),
            cross_encoder: Arc::new(ConstantEncoder),
            generator: Arc::new(EchoGenerator),
        },
        emitter,
        &Config::default(),
    );

    let envelope = orchestrator
        .ask(AskRequest::new("finance_employee", "What was Q4 revenue?").with_username("jdoe"))
        .await;
    assert_eq!(envelope.status, AnswerStatus::Ok);
    assert_eq!(envelope.citations, vec!["fin-001"]);

    let ids: Vec<&str> = envelope.sources.iter().map(|s| s.id.as_str()).collect();
    assert!(ids.contains(&"fin-001"));
    assert!(!ids.contains(&"fin-002"), "confidential finance chunk leaked");
    assert!(!ids.contains(&"hr-001"), "hr chunk leaked");

    let denied = orchestrator
        .ask(AskRequest::new("intern", "What was Q4 revenue?"))
        .await;
    assert_eq!(denied.status, AnswerStatus::Ok);
    assert!(denied.sources.iter().all(|s| s.id == "gen-001"));

    drop(orchestrator);
    worker.join().await;

    let db = Database::open(&path).unwrap();
    let events = db.list_audit_events(100).unwrap();
    assert!(!events.is_empty());
    assert!(events
        .iter()
        .any(|e| e.username == "jdoe" && e.action == AuditAction::Generation));
    assert!(events.iter().any(|e| e.role == "intern"));

    let stats = db.get_stats().unwrap();
    assert_eq!(stats.chunk_count, 4);
    assert_eq!(stats.embedded_count, 4);
    assert_eq!(stats.audit_event_count, events.len());
}

#[tokio::test]
async fn test_audit_log_rejects_edits() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir).await;

    let sink = SqliteAuditSink::open(&path).unwrap();
    let event = docgate_core::AuditContext {
        correlation_id: "req-1".to_string(),
        username: "jdoe".to_string(),
        role: "intern".to_string(),
        query: "q".to_string(),
    }
    .event(AuditAction::Response, docgate_core::AuditDecision::Completed);
    sink.record(&event).unwrap();

    let raw = rusqlite::Connection::open(&path).unwrap();
    assert!(raw
        .execute("UPDATE audit_events SET username = 'mallory'", [])
        .is_err());
    assert!(raw.execute("DELETE FROM audit_events", []).is_err());

    let db = Database::open(&path).unwrap();
    assert_eq!(db.count_audit_events().unwrap(), 1);
    assert_eq!(db.list_audit_events(10).unwrap()[0].username, "jdoe");
}
