//! HTTP-based cross-encoder using an external rerank endpoint

use super::{CrossEncoder, LLMClient, RerankDocument, ScoreScale};
use crate::config::LLMServiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Longest document text sent to the rerank service
const MAX_DOC_CHARS: usize = 2000;

/// Cross-encoder backed by a `/v1/rerank` service
pub struct HttpCrossEncoder {
    client: Arc<dyn LLMClient>,
    scale: ScoreScale,
}

impl HttpCrossEncoder {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>, scale: ScoreScale) -> Self {
        Self { client, scale }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        let scale = config.rerank_scale;
        let client = super::VLLMClient::new(config)?;
        Ok(Self::new(Arc::new(client), scale))
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<String> = documents
            .iter()
            .map(|doc| truncate_chars(&doc.text, MAX_DOC_CHARS).to_string())
            .collect();

        self.client.rerank(query, &texts).await
    }

    fn scale(&self) -> ScoreScale {
        self.scale
    }

    fn model_name(&self) -> &str {
        self.client.rerank_model_name()
    }
}

/// Truncate on a char boundary
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
