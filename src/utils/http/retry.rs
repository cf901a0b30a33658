//! Retry logic for language-model invocations

use crate::llm::LlmError;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            exponential_backoff: true,
        }
    }
}

impl RetryConfig {
    /// A config that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Execute an operation with retry logic
pub async fn execute_with_retry<F, Fut, T>(operation: F, config: &RetryConfig) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= config.max_attempts || !error.is_retryable() {
                    return Err(error);
                }

                let delay = calculate_delay(&error, attempt, config);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Model invocation failed, retrying: {}",
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Calculate delay for retry attempt
fn calculate_delay(error: &LlmError, attempt: usize, config: &RetryConfig) -> Duration {
    match error {
        LlmError::RateLimit {
            retry_after: Some(retry_after),
        } => std::cmp::min(Duration::from_secs(*retry_after), config.max_delay),
        _ if config.exponential_backoff => calculate_exponential_delay(attempt, config),
        _ => config.base_delay,
    }
}

/// Calculate exponential backoff delay
fn calculate_exponential_delay(attempt: usize, config: &RetryConfig) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.min(16) as u32);
    let exponential_delay = config.base_delay.saturating_mul(factor);
    std::cmp::min(exponential_delay, config.max_delay)
}
