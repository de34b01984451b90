//! Request orchestration
//!
//! Sequences role resolution, retrieval, the access check, reranking,
//! generation, formatting and scoring for one `Ask` request, and turns every
//! anticipated failure into an [`AnswerStatus`].

mod orchestrator;

pub use orchestrator::{Collaborators, Orchestrator};

use crate::response::AnswerStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Answer for an empty post-access-check candidate set
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find information available to your role that answers this question.";

/// Answer for an empty post-rerank candidate set
pub const LOW_RELEVANCE_ANSWER: &str =
    "Documents available to you were searched, but none were relevant enough to answer this question. Try rephrasing it.";

pub const RETRIEVAL_FAILED_ANSWER: &str =
    "Document search is temporarily unavailable. Please try again later.";

pub const GENERATION_FAILED_ANSWER: &str =
    "The answer service is temporarily unavailable. Please try again later.";

pub const ERROR_ANSWER: &str =
    "Sorry, something went wrong while answering your question. Please quote the reference id if you contact support.";

/// Position of a request in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    Retrieved,
    Filtered,
    Reranked,
    Generated,
    Formatted,
    Done,
    NoContext,
    LowRelevance,
    RetrievalFailed,
    GenerationFailed,
    Error,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Start => "start",
            PipelineState::Retrieved => "retrieved",
            PipelineState::Filtered => "filtered",
            PipelineState::Reranked => "reranked",
            PipelineState::Generated => "generated",
            PipelineState::Formatted => "formatted",
            PipelineState::Done => "done",
            PipelineState::NoContext => "no_context",
            PipelineState::LowRelevance => "low_relevance",
            PipelineState::RetrievalFailed => "retrieval_failed",
            PipelineState::GenerationFailed => "generation_failed",
            PipelineState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Early exits from a request; each maps to one [`AnswerStatus`]
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("no authorized content")]
    NoAuthorizedContent,

    #[error("no candidate above the relevance floor")]
    BelowRelevanceThreshold,

    /// Logged per chunk; the chunk is denied and the request continues
    #[error("malformed access metadata on chunk {chunk_id}: {reason}")]
    MalformedMetadata { chunk_id: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn status(&self) -> AnswerStatus {
        match self {
            PipelineError::RetrievalUnavailable(_) => AnswerStatus::RetrievalFailed,
            PipelineError::GenerationUnavailable(_) => AnswerStatus::GenerationFailed,
            PipelineError::NoAuthorizedContent | PipelineError::MalformedMetadata { .. } => {
                AnswerStatus::NoContext
            }
            PipelineError::BelowRelevanceThreshold => AnswerStatus::LowRelevance,
            PipelineError::Internal(_) => AnswerStatus::Error,
        }
    }

    pub fn state(&self) -> PipelineState {
        match self.status() {
            AnswerStatus::RetrievalFailed => PipelineState::RetrievalFailed,
            AnswerStatus::GenerationFailed => PipelineState::GenerationFailed,
            AnswerStatus::NoContext => PipelineState::NoContext,
            AnswerStatus::LowRelevance => PipelineState::LowRelevance,
            AnswerStatus::Error => PipelineState::Error,
            AnswerStatus::Ok => PipelineState::Done,
        }
    }

    /// Fixed, user-safe answer text
    pub fn user_message(&self) -> &'static str {
        match self.status() {
            AnswerStatus::RetrievalFailed => RETRIEVAL_FAILED_ANSWER,
            AnswerStatus::GenerationFailed => GENERATION_FAILED_ANSWER,
            AnswerStatus::NoContext => NO_CONTEXT_ANSWER,
            AnswerStatus::LowRelevance => LOW_RELEVANCE_ANSWER,
            AnswerStatus::Error | AnswerStatus::Ok => ERROR_ANSWER,
        }
    }
}

/// One `Ask` call
///
/// `role` is trusted as given; the caller must already have authenticated it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub username: String,
    pub role: String,
    pub query: String,
    /// 0 means the configured default
    #[serde(default)]
    pub top_k: usize,
}

impl AskRequest {
    pub fn new(role: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            username: "anonymous".to_string(),
            role: role.into(),
            query: query.into(),
            top_k: 0,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}
