//! Docgate Core Library
//!
//! Role-gated question answering over an internal document index.
//!
//! # Features
//! - Role table with inheritance and partition clearance
//! - Query normalization (quarter shorthand, abbreviations, variants)
//! - Partition-constrained vector retrieval with an independent access check
//! - Cross-encoder reranking with near-duplicate collapse
//! - Citation-enforcing prompts and citation validation
//! - Multi-factor confidence scoring
//! - Fire-and-forget audit trail backed by SQLite

pub mod access;
pub mod audit;
pub mod confidence;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod rbac;
pub mod rerank;
pub mod response;
pub mod retrieval;

pub use access::{AccessDecision, AccessFilter, AccessOutcome, AccessReport};
pub use audit::{
    AuditAction, AuditContext, AuditDecision, AuditEmitter, AuditEvent, AuditSink, AuditWorker,
    MemoryAuditSink, NullAuditSink, TracingAuditSink, DEFAULT_QUEUE_CAPACITY,
};
pub use confidence::{ConfidenceComponents, ConfidenceLevel, ConfidenceResult, ConfidenceScorer};
pub use config::{
    AuditConfig, AuditSinkKind, Config, IndexConfig, IndexKind, LLMServiceConfig, PipelineConfig,
    QueryConfig,
};
pub use db::{import_jsonl, ChunkRecord, Database, ImportStats, SqliteAuditSink, SqliteIndex};
pub use error::{DocGateError, Error, Result};
pub use generation::GenerationService;
pub use llm::{
    ChatMessage, CrossEncoder, Embedder, Generator, HttpCrossEncoder, HttpEmbedder, HttpGenerator,
    LLMClient, MetricsSnapshot, RerankDocument, ScoreScale, VLLMClient,
};
pub use pipeline::{AskRequest, Collaborators, Orchestrator, PipelineError, PipelineState};
pub use prompt::{Prompt, PromptBuilder, NOT_AVAILABLE_ANSWER};
pub use query::{NormalizedQuery, QueryNormalizer, Vocabulary};
pub use rbac::{
    Classification, EffectivePermissionSet, PartitionKey, Permission, RoleDescription,
    RoleResolver, RoleTable,
};
pub use rerank::{ReRanker, RerankOutcome};
pub use response::{AnswerEnvelope, AnswerStatus, ResponseFormatter, SourceInfo};
pub use retrieval::{
    AccessMetadata, AnnIndex, Candidate, Chunk, MemoryIndex, RelevanceScore, Retrieval,
    RetrievalStatus, VectorIndex, VectorRetriever,
};

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "docgate";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "docgate";
