//! Model service integration
//!
//! Provides traits and HTTP implementations for:
//! - Query embedding
//! - Cross-encoder reranking
//! - Grounded answer generation

mod cache;
mod client;
mod http_cross_encoder;
mod http_embedder;
mod http_generator;
mod traits;

pub use cache::{embedding_cache_key, CacheStats, EmbeddingCache};
pub use client::{ChatMessage, LLMClient, MetricsSnapshot, VLLMClient};
pub use http_cross_encoder::HttpCrossEncoder;
pub use http_embedder::HttpEmbedder;
pub use http_generator::HttpGenerator;
pub use traits::*;
