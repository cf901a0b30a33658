//! Language-model provider abstraction and implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod ollama;
pub mod openrouter;
pub mod prompts;

#[cfg(test)]
pub mod testing;

pub use prompts::{PromptContext, PromptTemplate, PromptTemplates};

/// Error types for LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimit { retry_after: Option<u64> },

    #[error("Invalid model: {model}")]
    InvalidModel { model: String },

    #[error("Request failed: {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid response format: {message}")]
    InvalidResponse { message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl LlmError {
    /// Whether a retry with backoff has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimit { .. } => true,
            LlmError::Network(_) => true,
            LlmError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Configuration for LLM generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: Some(2048),
        }
    }
}

/// Text-in, text-out language model capability.
///
/// Responses are untrusted: the returned string is *expected* to hold the JSON
/// shape requested in the prompt, but callers must parse and validate it.
/// Implementations hold no per-request state and are shared across concurrent
/// calls through an [`Arc`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "ollama", "openrouter")
    fn provider_name(&self) -> &str;

    /// Model this provider sends prompts to
    fn model(&self) -> &str;

    /// Send a single prompt and return the raw completion text
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Shared handle to a provider
pub type SharedProvider = Arc<dyn LlmProvider>;

/// Factory for creating LLM providers
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create the provider named in `settings`
    pub fn create_provider(settings: &ProviderSettings) -> Result<SharedProvider, LlmError> {
        match settings.provider.to_lowercase().as_str() {
            "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(settings)?)),
            "openrouter" => {
                let api_key = settings.api_key.clone().ok_or_else(|| LlmError::Authentication {
                    message: "OpenRouter API key not provided".to_string(),
                })?;
                Ok(Arc::new(openrouter::OpenRouterProvider::new(api_key, settings)?))
            }
            other => Err(LlmError::Unknown {
                message: format!("Unknown provider: {}", other),
            }),
        }
    }

    /// List all available provider names
    pub fn list_providers() -> Vec<&'static str> {
        vec!["ollama", "openrouter"]
    }

    /// Whether the provider refuses to start without an API key
    pub fn requires_api_key(provider: &str) -> bool {
        matches!(provider.to_lowercase().as_str(), "openrouter")
    }
}

/// Everything a provider client needs to be constructed
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    pub generation: GenerationConfig,
}

impl ProviderSettings {
    pub fn new<P: Into<String>, M: Into<String>>(provider: P, model: M) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
            timeout_seconds: crate::utils::http::DEFAULT_TIMEOUT.as_secs(),
            generation: GenerationConfig::default(),
        }
    }
}
