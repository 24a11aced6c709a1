//! Retry policy for provider HTTP calls.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};

use crate::error::{AiError, Result};

/// Longest `Retry-After` the client is willing to honour.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY: usize = 512;

/// Exponential backoff for connect errors, 429 and 5xx responses.
#[derive(Debug, Clone)]
pub struct LlmRetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for LlmRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl LlmRetryConfig {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Wait before retry number `attempt` (1-based). A server-provided
    /// `Retry-After` wins over the backoff curve, up to one minute.
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after_secs {
            return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
        }

        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let cap_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(scaled_ms.min(cap_ms).round() as u64)
    }
}

/// Send the request produced by `build`, retrying transient failures.
///
/// `build` is called once per attempt. Returns the first successful
/// response, or the last error once retries are spent or the error is not
/// retryable.
pub(crate) async fn send_with_retry<F>(
    config: &LlmRetryConfig,
    provider: &str,
    build: F,
) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let error = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => response_to_error(response, provider).await,
            Err(e) => AiError::Http(e),
        };

        if !error.is_retryable() || attempt >= config.max_retries {
            return Err(error);
        }
        attempt += 1;
        let delay = config.delay_for(attempt, error.retry_after());
        tracing::warn!(
            provider = %provider,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying LLM request"
        );
        tokio::time::sleep(delay).await;
    }
}

fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn response_to_error(response: Response, provider: &str) -> AiError {
    let status = response.status().as_u16();
    let retry_after_secs = parse_retry_after(&response);
    let mut message = response.text().await.unwrap_or_default();

    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("... [truncated]");
    }

    AiError::LlmHttp {
        provider: provider.to_string(),
        status,
        message,
        retry_after_secs,
    }
}
