//! Ollama LLM provider implementation

use super::{GenerationConfig, LlmError, LlmProvider, ProviderSettings};
use crate::utils::http::{create_client, endpoint, parse_http_error};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for a local or remote Ollama server, using JSON output mode
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
    #[serde(skip_serializing_if = "OllamaOptions::is_empty")]
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl OllamaOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            client: create_client(Duration::from_secs(settings.timeout_seconds))?,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings.model.clone(),
            generation: settings.generation.clone(),
        })
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.generation.temperature,
                num_predict: self.generation.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        let url = endpoint(&self.base_url, "api/generate");
        let response = self
            .client
            .post(&url)
            .json(&self.build_request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status, &body, Some(&self.model)));
        }

        let body: OllamaGenerateResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse Ollama response: {}", e),
            })?;

        if !body.done {
            debug!(model = %self.model, "Ollama reported an unfinished generation");
        }

        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_json_mode_without_streaming() {
        let provider = OllamaProvider::new(&ProviderSettings::new("ollama", "gemma3:4b")).unwrap();
        let value = serde_json::to_value(provider.build_request("plan a lecture")).unwrap();

        assert_eq!(value["model"], "gemma3:4b");
        assert_eq!(value["format"], "json");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 2048);
    }

    #[test]
    fn test_options_omitted_when_unset() {
        let mut settings = ProviderSettings::new("ollama", "gemma3:1b");
        settings.generation = GenerationConfig {
            temperature: None,
            max_tokens: None,
        };
        let provider = OllamaProvider::new(&settings).unwrap();
        let value = serde_json::to_value(provider.build_request("x")).unwrap();
        assert!(value.get("options").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body: OllamaGenerateResponse =
            serde_json::from_str(r#"{"model":"gemma3:4b","response":"{\"a\":1}","done":true}"#)
                .unwrap();
        assert_eq!(body.response, "{\"a\":1}");
        assert!(body.done);
    }
}
