//! Model service trait definitions

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Cross-encoder relevance scoring trait
///
/// Implementations score every (query, document) pair jointly. An `Err`
/// (including a transport failure) is the "unavailable" branch; callers
/// degrade instead of failing the request.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score documents against a query, one score per document in input order
    async fn score(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>>;

    /// Range of the scores returned by `score`
    fn scale(&self) -> ScoreScale;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Answer generation trait
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce answer text for a system/user prompt pair
    async fn generate(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32)
        -> Result<String>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Document for reranking
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: String,
    pub text: String,
}

/// Range of relevance scores produced by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoreScale {
    /// Already within 0.0 - 1.0
    #[default]
    Probability,
    /// Unbounded cross-encoder logit
    Logit,
}

impl ScoreScale {
    /// Map a raw score onto 0.0 - 1.0
    pub fn normalize(self, raw: f64) -> f64 {
        if raw.is_nan() {
            return 0.0;
        }
        match self {
            ScoreScale::Probability => raw.clamp(0.0, 1.0),
            ScoreScale::Logit => logistic(raw),
        }
    }
}

/// Logistic squashing; saturates instead of overflowing
pub fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
