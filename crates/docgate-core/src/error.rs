//! Error types for docgate

use thiserror::Error;

/// Result type alias using DocGateError
pub type Result<T> = std::result::Result<T, DocGateError>;

/// Error type alias for convenience
pub type Error = DocGateError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const SERVICE_UNAVAILABLE: i32 = 4;
}

/// Main error type for docgate
#[derive(Debug, Error)]
pub enum DocGateError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Role table error: {0}")]
    RoleTable(String),

    #[error("{service} unavailable: {reason}")]
    ServiceUnavailable {
        service: &'static str,
        reason: String,
    },

    #[error("{service} timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("Index error: {0}")]
    Index(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DocGateError {
    /// Shorthand for an unavailable external service
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service,
            reason: reason.into(),
        }
    }

    /// Whether the error means an external collaborator could not be reached
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. } | Self::Timeout { .. } | Self::Http(_)
        )
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => exit_codes::NOT_FOUND,
            Self::InvalidInput(_)
            | Self::InvalidEmbedding(_)
            | Self::Config(_)
            | Self::RoleTable(_) => {
                exit_codes::INVALID_INPUT
            }
            Self::ServiceUnavailable { .. } | Self::Timeout { .. } | Self::Http(_) => {
                exit_codes::SERVICE_UNAVAILABLE
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
