//! HTTP client for external model services (vLLM, OpenAI, TEI, etc.)

use super::cache::{embedding_cache_key, EmbeddingCache};
use crate::config::LLMServiceConfig;
use crate::error::{DocGateError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for model service clients
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate chat completion
    async fn chat_completion(&self, messages: Vec<ChatMessage>, max_tokens: u32)
        -> Result<String>;

    /// Generate embeddings for text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Score documents against a query with a cross-encoder
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>>;

    /// Get embedding dimensions
    fn embedding_dimensions(&self) -> usize;

    /// Get chat model name
    fn model_name(&self) -> &str;

    /// Get embedding model name
    fn embedding_model_name(&self) -> &str;

    /// Get rerank model name
    fn rerank_model_name(&self) -> &str;
}

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// API metrics for monitoring
#[derive(Debug, Default)]
pub struct APIMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

/// Snapshot of API metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
}

/// vLLM/OpenAI-compatible client
pub struct VLLMClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    embedding_dimensions: usize,
    cache: Arc<EmbeddingCache>,
    metrics: Arc<APIMetrics>,
}

impl VLLMClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(DocGateError::Http)?;

        // Use configured dimensions or default to 384
        let embedding_dimensions = config.embedding_dimensions.unwrap_or(384);

        Ok(Self {
            http_client,
            config,
            embedding_dimensions,
            cache: Arc::new(EmbeddingCache::new()),
            metrics: Arc::new(APIMetrics::default()),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LLMServiceConfig::default())
    }

    /// Get current API metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        let total = self.metrics.total_requests.load(Ordering::Relaxed);
        let hits = self.metrics.cache_hits.load(Ordering::Relaxed);
        let misses = self.metrics.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        MetricsSnapshot {
            total_requests: total,
            total_errors: self.metrics.total_errors.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64 * 100.0
            } else {
                0.0
            },
            avg_latency_ms: if total > 0 {
                self.metrics.total_latency_ms.load(Ordering::Relaxed) as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn record_error(&self) {
        self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, start: Instant) {
        let elapsed = start.elapsed().as_millis() as u64;
        self.metrics
            .total_latency_ms
            .fetch_add(elapsed, Ordering::Relaxed);
    }

    async fn post_json<Req, Resp>(&self, url: &str, service: &'static str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let mut req = self.http_client.post(url).json(body);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
            self.record_error();
            if e.is_timeout() {
                DocGateError::Timeout {
                    service,
                    secs: self.config.timeout_secs,
                }
            } else {
                DocGateError::unavailable(service, e.to_string())
            }
        })?;

        if !response.status().is_success() {
            self.record_error();
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DocGateError::unavailable(
                service,
                format!("HTTP {}: {}", status, body),
            ));
        }

        response.json().await.map_err(|e| {
            self.record_error();
            DocGateError::Llm(format!("{} returned an unreadable body: {}", service, e))
        })
    }
}

#[async_trait]
impl LLMClient for VLLMClient {
    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> Result<String> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        #[derive(Serialize)]
        struct ChatRequest {
            model: String,
            messages: Vec<ChatMessage>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
        }

        // Grounded answers: keep sampling close to deterministic
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: 0.1,
            max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.url);
        let chat_response: ChatResponse = self.post_json(&url, "generator", &request).await?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                self.record_error();
                DocGateError::Llm("No response from LLM".to_string())
            })?
            .message
            .content;

        self.record_latency(start);
        Ok(content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| DocGateError::Llm("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        // Check cache for each text
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached_texts = Vec::new();
        let mut uncached_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let cache_key = embedding_cache_key(&self.config.embedding_model, text);
            if let Some(cached) = self.cache.get(&cache_key) {
                results.push(Some(cached));
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
            results.push(None);
            uncached_texts.push(text.clone());
            uncached_indices.push(i);
        }

        if !uncached_texts.is_empty() {
            tracing::debug!(
                "Embedding batch: {} cached, {} to fetch",
                texts.len() - uncached_texts.len(),
                uncached_texts.len()
            );

            #[derive(Serialize)]
            struct EmbedRequest {
                model: String,
                input: Vec<String>,
            }

            #[derive(Deserialize)]
            struct EmbedResponse {
                data: Vec<EmbedData>,
            }

            #[derive(Deserialize)]
            struct EmbedData {
                embedding: Vec<f32>,
            }

            let request = EmbedRequest {
                model: self.config.embedding_model.clone(),
                input: uncached_texts.clone(),
            };

            let url = format!("{}/v1/embeddings", self.config.embeddings_url());
            let embed_response: EmbedResponse = self.post_json(&url, "embedder", &request).await?;

            if embed_response.data.len() != uncached_texts.len() {
                self.record_error();
                return Err(DocGateError::Llm(format!(
                    "Embedding service returned {} vectors for {} inputs",
                    embed_response.data.len(),
                    uncached_texts.len()
                )));
            }

            for ((original_idx, text), data) in uncached_indices
                .iter()
                .zip(uncached_texts.iter())
                .zip(embed_response.data)
            {
                self.cache.set(
                    embedding_cache_key(&self.config.embedding_model, text),
                    data.embedding.clone(),
                );
                results[*original_idx] = Some(data.embedding);
            }
        } else {
            tracing::debug!("All {} embeddings from cache", texts.len());
        }

        self.record_latency(start);

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| DocGateError::Llm("Missing embedding in batch".to_string())))
            .collect()
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        #[derive(Serialize)]
        struct RerankRequest<'a> {
            model: &'a str,
            query: &'a str,
            documents: &'a [String],
        }

        #[derive(Deserialize)]
        struct RerankResponse {
            results: Vec<RerankItem>,
        }

        #[derive(Deserialize)]
        struct RerankItem {
            index: usize,
            relevance_score: f64,
        }

        let request = RerankRequest {
            model: &self.config.rerank_model,
            query,
            documents,
        };

        let url = format!("{}/v1/rerank", self.config.reranker_url());
        let response: RerankResponse = self.post_json(&url, "reranker", &request).await?;

        // Results come back sorted by score; restore input order
        let mut scores = vec![None; documents.len()];
        for item in response.results {
            if let Some(slot) = scores.get_mut(item.index) {
                *slot = Some(item.relevance_score);
            }
        }

        self.record_latency(start);

        scores
            .into_iter()
            .enumerate()
            .map(|(idx, s)| {
                s.ok_or_else(|| DocGateError::Llm(format!("Reranker omitted document {}", idx)))
            })
            .collect()
    }

    fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn embedding_model_name(&self) -> &str {
        &self.config.embedding_model
    }

    fn rerank_model_name(&self) -> &str {
        &self.config.rerank_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_start_empty() {
        let client = VLLMClient::new(LLMServiceConfig::default()).unwrap();
        let snapshot = client.metrics();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.cache_hit_rate, 0.0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let config = LLMServiceConfig {
            url: "http://127.0.0.1:9".to_string(),
            embedding_url: None,
            rerank_url: None,
            timeout_secs: 2,
            ..LLMServiceConfig::default()
        };
        let client = VLLMClient::new(config).unwrap();

        let err = client
            .chat_completion(vec![ChatMessage::user("hi")], 16)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(client.metrics().total_errors, 1);
    }
}
