//! Language model call with a hard deadline

use crate::error::{DocGateError, Result};
use crate::llm::Generator;
use crate::prompt::Prompt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);
const DEFAULT_MAX_TOKENS: u32 = 512;

/// Wraps a [`Generator`]; its output is never trusted to follow the prompt rules
pub struct GenerationService {
    generator: Arc<dyn Generator>,
    timeout: Duration,
    max_tokens: u32,
}

impl GenerationService {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Generate answer text; timeouts and blank completions are errors
    pub async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let answer = tokio::time::timeout(
            self.timeout,
            self.generator
                .generate(&prompt.system, &prompt.user, self.max_tokens),
        )
        .await
        .map_err(|_| DocGateError::Timeout {
            service: "generator",
            secs: self.timeout.as_secs(),
        })??;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(DocGateError::Llm("empty completion".to_string()));
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Generator for Echo {
        async fn generate(&self, _system: &str, user: &str, max_tokens: u32) -> Result<String> {
            Ok(format!("  {} ({})  ", user, max_tokens))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct Hanging;

    #[async_trait]
    impl Generator for Hanging {
        async fn generate(&self, _system: &str, _user: &str, _max_tokens: u32) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok("late".to_string())
        }

        fn model_name(&self) -> &str {
            "hanging"
        }
    }

    fn prompt(user: &str) -> Prompt {
        Prompt {
            system: "s".to_string(),
            user: user.to_string(),
        }
    }

    #[tokio::test]
    async fn test_passes_max_tokens_and_trims() {
        let service = GenerationService::new(Arc::new(Echo)).with_max_tokens(64);
        assert_eq!(service.generate(&prompt("hi")).await.unwrap(), "hi (64)");
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let service =
            GenerationService::new(Arc::new(Hanging)).with_timeout(Duration::from_millis(10));
        let err = service.generate(&prompt("hi")).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_blank_completion_is_error() {
        struct Blank;

        #[async_trait]
        impl Generator for Blank {
            async fn generate(&self, _: &str, _: &str, _: u32) -> Result<String> {
                Ok("   ".to_string())
            }

            fn model_name(&self) -> &str {
                "blank"
            }
        }

        let service = GenerationService::new(Arc::new(Blank));
        assert!(service.generate(&prompt("x")).await.is_err());
    }
}
