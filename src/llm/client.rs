//! Completion service abstraction and provider selection
//!
//! Every model call in the orchestration core goes through [`LLMClient`]:
//! - **Ollama**: local inference with streaming (default feature)
//! - **OpenAI**: OpenAI API and compatible endpoints (feature `openai`)

use crate::types::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Incremental text fragments produced by a streaming completion.
pub type TextStream = Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>;

/// Generic LLM client trait for provider abstraction
///
/// All LLM providers implement this trait, allowing for easy swapping
/// between providers without changing application code.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Stream a completion as ordered text fragments
    async fn stream(&self, prompt: &str, max_tokens: u32) -> Result<TextStream>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection
///
/// | Provider | Feature | Streaming |
/// |----------|---------|-----------|
/// | OpenAI | `openai` | ✅ |
/// | Ollama | `ollama` (default) | ✅ |
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// OpenAI API provider (including Azure OpenAI and compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "llama3.2".to_string(),
    /// };
    /// ```
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Create a shared client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's cargo feature is not enabled.
    pub async fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Arc::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
            ))),

            #[cfg(not(feature = "openai"))]
            Provider::OpenAI { model, .. } => Err(AppError::LLM(format!(
                "OpenAI provider requested for model '{}' but the 'openai' feature is not enabled",
                model
            ))),

            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Arc::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone())?,
            )),

            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { model, .. } => Err(AppError::LLM(format!(
                "Ollama provider requested for model '{}' but the 'ollama' feature is not enabled",
                model
            ))),
        }
    }

    /// Check if this provider is compiled into the binary
    pub fn is_enabled(&self) -> bool {
        match self {
            Provider::OpenAI { .. } => cfg!(feature = "openai"),
            Provider::Ollama { .. } => cfg!(feature = "ollama"),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_and_model() {
        let openai = Provider::OpenAI {
            api_key: "".to_string(),
            api_base: "".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        assert_eq!(openai.name(), "OpenAI");
        assert_eq!(openai.model(), "gpt-4o-mini");

        let ollama = Provider::Ollama {
            base_url: "".to_string(),
            model: "llama3.2".to_string(),
        };
        assert_eq!(ollama.name(), "Ollama");
        assert_eq!(ollama.model(), "llama3.2");
    }

    #[cfg(not(feature = "openai"))]
    #[tokio::test]
    async fn test_disabled_provider_returns_helpful_error() {
        let provider = Provider::OpenAI {
            api_key: "test-key".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        };
        assert!(!provider.is_enabled());

        let err = match provider.create_client().await {
            Ok(_) => panic!("Expected error"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("gpt-4o"));
        assert!(err.contains("'openai' feature"));
    }
}
