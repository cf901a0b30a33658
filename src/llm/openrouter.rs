//! OpenRouter LLM provider implementation

use super::{GenerationConfig, LlmError, LlmProvider, ProviderSettings};
use crate::utils::http::{create_client, endpoint, parse_http_error};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter chat-completions provider
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider
    pub fn new(api_key: String, settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            client: create_client(Duration::from_secs(settings.timeout_seconds))?,
            api_key,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings.model.clone(),
            generation: settings.generation.clone(),
        })
    }

    /// Create OpenRouter request headers
    fn create_headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            LlmError::Authentication {
                message: "API key contains characters not allowed in a header".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("X-Title", HeaderValue::from_static("Lectern"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_body(&self, prompt: &str) -> serde_json::Value {
        let mut request_body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": { "type": "json_object" },
        });

        if let Some(temp) = self.generation.temperature {
            request_body["temperature"] = temp.into();
        }
        if let Some(max_tokens) = self.generation.max_tokens {
            request_body["max_tokens"] = max_tokens.into();
        }

        request_body
    }
}

/// Pull the assistant text out of a chat-completions response body
fn extract_content(body: &serde_json::Value) -> Result<String, LlmError> {
    body["choices"]
        .get(0)
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::InvalidResponse {
            message: "No message content in chat completion".to_string(),
        })
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn provider_name(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        let url = endpoint(&self.base_url, "chat/completions");
        let response = self
            .client
            .post(&url)
            .headers(self.create_headers()?)
            .json(&self.build_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status, &body, Some(&self.model)));
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse chat completion: {}", e),
            })?;

        extract_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenRouterProvider {
        let settings = ProviderSettings::new("openrouter", "anthropic/claude-3-haiku");
        OpenRouterProvider::new("sk-test".to_string(), &settings).unwrap()
    }

    #[test]
    fn test_body_requests_json_object() {
        let body = provider().build_body("hello");
        assert_eq!(body["model"], "anthropic/claude-3-haiku");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn test_headers_carry_bearer_token() {
        let headers = provider().create_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
    }

    #[test]
    fn test_extract_content() {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"ok\":true}" } }]
        });
        assert_eq!(extract_content(&body).unwrap(), "{\"ok\":true}");
        assert!(matches!(
            extract_content(&serde_json::json!({ "choices": [] })),
            Err(LlmError::InvalidResponse { .. })
        ));
    }
}
