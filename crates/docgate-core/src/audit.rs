//! Append-only audit trail of authorization decisions
//!
//! Events are handed to an [`AuditEmitter`], which forwards them over a
//! bounded channel to a background task that writes to an [`AuditSink`].
//! Emitting never blocks and never fails the caller. A full queue or a sink
//! failure drops the event, logs it and counts it in [`AuditEmitter::dropped`].

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Pipeline step an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RoleResolution,
    Retrieval,
    AccessCheck,
    Rerank,
    Generation,
    Response,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RoleResolution => "role_resolution",
            AuditAction::Retrieval => "retrieval",
            AuditAction::AccessCheck => "access_check",
            AuditAction::Rerank => "rerank",
            AuditAction::Generation => "generation",
            AuditAction::Response => "response",
        }
    }
}

/// Outcome recorded for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    Granted,
    Denied,
    MalformedMetadata,
    Empty,
    Failed,
    Degraded,
    Completed,
    Error,
}

impl AuditDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditDecision::Granted => "granted",
            AuditDecision::Denied => "denied",
            AuditDecision::MalformedMetadata => "malformed_metadata",
            AuditDecision::Empty => "empty",
            AuditDecision::Failed => "failed",
            AuditDecision::Degraded => "degraded",
            AuditDecision::Completed => "completed",
            AuditDecision::Error => "error",
        }
    }
}

impl fmt::Display for AuditDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One authorization-relevant step of one request
///
/// Carries chunk ids only, never chunk text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub username: String,
    pub role: String,
    pub action: AuditAction,
    pub query: String,
    pub chunk_ids_touched: Vec<String>,
    pub decision: AuditDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Request identity shared by every event of one request
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub correlation_id: String,
    pub username: String,
    pub role: String,
    pub query: String,
}

impl AuditContext {
    pub fn event(&self, action: AuditAction, decision: AuditDecision) -> AuditEvent {
        AuditEvent {
            timestamp: Utc::now(),
            correlation_id: self.correlation_id.clone(),
            username: self.username.clone(),
            role: self.role.clone(),
            action,
            query: self.query.clone(),
            chunk_ids_touched: Vec::new(),
            decision,
            detail: None,
        }
    }
}

impl AuditEvent {
    pub fn with_chunks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunk_ids_touched = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Persistence target for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<()>;

    /// Sink name for logs
    fn name(&self) -> &str;
}

/// Keeps events in memory (tests, short-lived tools)
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Writes events as structured log records
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        tracing::info!(
            target: "docgate::audit",
            correlation_id = %event.correlation_id,
            username = %event.username,
            role = %event.role,
            action = event.action.as_str(),
            decision = event.decision.as_str(),
            chunks = ?event.chunk_ids_touched,
            detail = event.detail.as_deref().unwrap_or(""),
            "audit"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Discards events
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

enum AuditMessage {
    Event(Box<AuditEvent>),
    Flush(oneshot::Sender<()>),
}

/// Events buffered between emitters and the sink
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Fire-and-forget handle for emitting audit events
#[derive(Clone)]
pub struct AuditEmitter {
    tx: mpsc::Sender<AuditMessage>,
    dropped: Arc<AtomicU64>,
}

/// Background writer task; completes once every emitter is dropped
pub struct AuditWorker {
    handle: JoinHandle<()>,
}

impl AuditEmitter {
    /// Start the background writer. Must be called inside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> (Self, AuditWorker) {
        Self::spawn_with_capacity(sink, DEFAULT_QUEUE_CAPACITY)
    }

    /// Start the background writer with a queue of `capacity` events
    pub fn spawn_with_capacity(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, AuditWorker) {
        let (tx, mut rx) = mpsc::channel::<AuditMessage>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let worker_dropped = dropped.clone();

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    AuditMessage::Event(event) => {
                        if let Err(e) = sink.record(&event) {
                            worker_dropped.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                sink = sink.name(),
                                correlation_id = %event.correlation_id,
                                "Audit write failed: {}",
                                e
                            );
                        }
                    }
                    AuditMessage::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        (Self { tx, dropped }, AuditWorker { handle })
    }

    /// Queue an event; never blocks and never fails
    pub fn emit(&self, event: AuditEvent) {
        match self.tx.try_send(AuditMessage::Event(Box::new(event))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(AuditMessage::Event(event))) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    correlation_id = %event.correlation_id,
                    action = event.action.as_str(),
                    "Audit queue full; event dropped"
                );
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Audit channel closed; event dropped");
            }
        }
    }

    /// Wait until every event emitted before this call has been written
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(AuditMessage::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Flush outstanding events and release this handle
    pub async fn shutdown(self) {
        self.flush().await;
    }

    /// Events lost to a full queue, a closed channel or a failing sink
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditWorker {
    /// Wait for the writer to drain after all emitters are dropped
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("Audit worker ended abnormally: {}", e);
        }
    }
}
