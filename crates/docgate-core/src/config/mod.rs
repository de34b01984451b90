//! Configuration management

use crate::error::{DocGateError, Result};
use crate::llm::ScoreScale;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// External model services
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    /// Retrieval and grounding knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Where audit events go
    #[serde(default)]
    pub audit: AuditConfig,

    /// Vector index location
    #[serde(default)]
    pub index: IndexConfig,

    /// Optional role table file; the built-in table is used when absent
    #[serde(default)]
    pub roles: Option<PathBuf>,

    /// Query normalization
    #[serde(default)]
    pub query: QueryConfig,
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the LLM service for chat/completions
    pub url: String,

    /// Model name for answer generation
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (will be auto-detected if not specified)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// Base URL for the cross-encoder rerank service
    #[serde(default)]
    pub rerank_url: Option<String>,

    /// Cross-encoder model name
    #[serde(default = "default_rerank_model")]
    pub rerank_model: String,

    /// Whether the reranker returns probabilities or raw logits
    #[serde(default)]
    pub rerank_scale: ScoreScale,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Transport timeout for every HTTP request in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Hard deadline for a generation call
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Hard deadline for a rerank call
    #[serde(default = "default_rerank_timeout")]
    pub rerank_timeout_secs: u64,

    /// Token budget for generated answers
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }

    /// Get the rerank URL (falls back to main URL if not specified)
    pub fn reranker_url(&self) -> &str {
        self.rerank_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DOCGATE_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_chat_model(),
            embedding_url: std::env::var("DOCGATE_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: std::env::var("DOCGATE_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            rerank_url: std::env::var("DOCGATE_RERANK_URL").ok(),
            rerank_model: default_rerank_model(),
            rerank_scale: ScoreScale::default(),
            api_key: std::env::var("DOCGATE_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
            generation_timeout_secs: default_generation_timeout(),
            rerank_timeout_secs: default_rerank_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("DOCGATE_LLM_MODEL")
        .unwrap_or_else(|_| "meta-llama/Llama-3.1-8B-Instruct".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("DOCGATE_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_rerank_model() -> String {
    std::env::var("DOCGATE_RERANK_MODEL")
        .unwrap_or_else(|_| "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string())
}

fn default_timeout() -> u64 {
    60
}

fn default_generation_timeout() -> u64 {
    45
}

fn default_rerank_timeout() -> u64 {
    15
}

fn default_max_tokens() -> u32 {
    512
}

/// Retrieval, reranking and formatting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of chunks handed to generation when the caller does not say
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Upper bound on a caller-supplied top_k
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Retrieval pool size as a multiple of top_k (reranker input)
    #[serde(default = "default_candidate_pool_factor")]
    pub candidate_pool_factor: usize,

    /// Extra multiplier when the index cannot filter by partition
    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,

    /// Minimum normalized relevance (0.0 - 1.0) a chunk needs after reranking
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,

    /// Token-overlap ratio at which two chunks count as duplicates
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,

    /// Maximum characters of chunk text exposed in a source preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Deadline for the embedding and index calls in seconds
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            candidate_pool_factor: default_candidate_pool_factor(),
            over_fetch_factor: default_over_fetch_factor(),
            relevance_floor: default_relevance_floor(),
            dedup_threshold: default_dedup_threshold(),
            preview_chars: default_preview_chars(),
            retrieval_timeout_secs: default_retrieval_timeout(),
        }
    }
}

impl PipelineConfig {
    /// Clamp a requested top_k into the supported range
    pub fn effective_top_k(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_top_k
        } else {
            requested.min(self.max_top_k)
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.relevance_floor) {
            return Err(DocGateError::Config(format!(
                "pipeline.relevance_floor must be within 0.0..=1.0, got {}",
                self.relevance_floor
            )));
        }
        if !(0.0..=1.0).contains(&self.dedup_threshold) || self.dedup_threshold == 0.0 {
            return Err(DocGateError::Config(format!(
                "pipeline.dedup_threshold must be within (0.0, 1.0], got {}",
                self.dedup_threshold
            )));
        }
        if self.default_top_k == 0 || self.candidate_pool_factor == 0 || self.over_fetch_factor == 0
        {
            return Err(DocGateError::Config(
                "pipeline sizes and factors must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    50
}

fn default_max_variants() -> usize {
    1
}

fn default_audit_queue_capacity() -> usize {
    crate::audit::DEFAULT_QUEUE_CAPACITY
}

fn default_candidate_pool_factor() -> usize {
    4
}

fn default_over_fetch_factor() -> usize {
    5
}

fn default_relevance_floor() -> f64 {
    0.1
}

fn default_dedup_threshold() -> f64 {
    0.95
}

fn default_preview_chars() -> usize {
    200
}

fn default_retrieval_timeout() -> u64 {
    20
}

/// Query normalization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Vocabulary file (abbreviations, stop words, key terms); built-in when absent
    #[serde(default)]
    pub vocabulary: Option<PathBuf>,

    /// Texts retrieved per question: the normalized query plus up to
    /// `max_variants - 1` variants, merged by best similarity
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            vocabulary: None,
            max_variants: default_max_variants(),
        }
    }
}

/// Audit sink selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Append to the `audit_events` table of the index database
    #[default]
    Sqlite,
    /// Emit events as structured log records only
    Tracing,
    /// Drop events (tests, local experiments)
    None,
}

/// Audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub sink: AuditSinkKind,

    /// Separate database file for audit events; defaults to the index database
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Events buffered ahead of the sink; further events are dropped and counted
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::default(),
            path: None,
            queue_capacity: default_audit_queue_capacity(),
        }
    }
}

/// How queries reach the stored embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Partition predicate in SQL, exact cosine per query
    #[default]
    Sqlite,
    /// HNSW graph built in memory at startup; no partition pushdown
    Hnsw,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexConfig {
    /// SQLite file holding chunks and embeddings
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub kind: IndexKind,
}

impl IndexConfig {
    /// Resolved database path (`DOCGATE_DB` wins over the config file)
    pub fn database_path(&self) -> PathBuf {
        std::env::var("DOCGATE_DB")
            .map(PathBuf::from)
            .ok()
            .or_else(|| self.path.clone())
            .unwrap_or_else(crate::db::Database::default_path)
    }
}

impl Config {
    /// Load config from `DOCGATE_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var("DOCGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self::load_from(&path)
    }

    /// Load config from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_yaml(&content)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.pipeline.validate()?;
        if config.query.max_variants == 0 {
            return Err(DocGateError::Config(
                "query.max_variants must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }
}
