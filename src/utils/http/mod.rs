//! Shared HTTP utilities for LLM providers
//!
//! Client setup, retry logic and error-status mapping shared by every
//! HTTP-backed provider.

use crate::llm::LlmError;
use reqwest::Client;
use std::time::Duration;

pub mod retry;

pub use retry::{execute_with_retry, RetryConfig};

/// Default timeout for HTTP requests (2 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Create a configured reqwest client with standard settings
pub fn create_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
        .build()
        .map_err(LlmError::Network)
}

/// Parse standard HTTP error responses
pub fn parse_http_error(status: u16, body: &str, model_name: Option<&str>) -> LlmError {
    match status {
        429 => LlmError::RateLimit {
            retry_after: extract_retry_after(body),
        },
        401 | 403 => LlmError::Authentication {
            message: "Invalid API key or insufficient permissions".to_string(),
        },
        400 | 404
            if body.contains("model")
                && (body.contains("not found")
                    || body.contains("invalid")
                    || body.contains("does not exist")) =>
        {
            LlmError::InvalidModel {
                model: model_name.unwrap_or("unknown").to_string(),
            }
        }
        _ => LlmError::RequestFailed {
            status,
            message: body.to_string(),
        },
    }
}

/// Extract retry-after value from error response
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after").and_then(|v| v.as_u64()).or_else(|| {
        json.get("error")
            .and_then(|e| e.get("retry_after"))
            .and_then(|v| v.as_u64())
    })
}

/// Join a base URL and an endpoint path without doubling slashes
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
