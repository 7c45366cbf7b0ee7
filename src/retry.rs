//! Retry utilities with exponential backoff.
//!
//! Used by [`crate::llm`] to ride out transient failures when talking to an
//! LLM server, and available to tool sources (MCP subprocess restarts,
//! remote HTTP tool calls) that need the same behavior.
//!
//! # Examples
//!
//! ```rust,no_run
//! use agent_orchestrator::retry::{retry_with_backoff, RetryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default().with_max_attempts(3);
//!
//! let result = retry_with_backoff(&config, || async {
//!     Ok::<_, agent_orchestrator::Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Random jitter fraction applied to each delay, 0.0 to 1.0.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Retry an async operation with exponential backoff, unconditionally on
/// every error.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff_conditional(operation, config, |_| true).await
}

/// Determine if an error is worth retrying at the level of a generic
/// operation (non-LLM). Conservative: only transport/IO/timeout-flavored
/// errors are retryable; anything that represents a caller mistake is not.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::LlmTransport(e) => e
            .status()
            .map(|s| s.as_u16() == 429 || s.is_server_error())
            .unwrap_or(true),
        Error::ToolTimeout(_) => true,
        Error::Io(_) => true,
        Error::Json(_) => false,
        Error::InvalidArgument(_) => false,
        Error::Config(_) => false,
        Error::ToolNotFound(_) => false,
        Error::Cancelled => false,
        _ => false,
    }
}

/// Retry an async operation with exponential backoff, only retrying when
/// `should_retry` returns true for the error.
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    should_retry: impl Fn(&Error) -> bool,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !should_retry(&err) {
                    return Err(err);
                }

                last_error = Some(err);

                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other("retry failed with no error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(1.5)
            .with_jitter_factor(0.2);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.jitter_factor, 0.2);
    }

    #[test]
    fn test_calculate_delay_grows() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.0);

        let delay0 = config.calculate_delay(0);
        let delay1 = config.calculate_delay(1);
        let delay2 = config.calculate_delay(2);

        assert!(delay1 > delay0);
        assert!(delay2 > delay1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(5));

        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();
        let result = retry_with_backoff_conditional(
            move || {
                let count = count_clone.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if count < 3 {
                        Err(Error::tool_timeout("flaky"))
                    } else {
                        Ok::<i32, Error>(42)
                    }
                }
            },
            &config,
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(5));

        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();
        let result: Result<i32> = retry_with_backoff_conditional(
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::tool_timeout("down")) }
            },
            &config,
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let config = RetryConfig::new().with_max_attempts(5);

        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();
        let result: Result<i32> = retry_with_backoff_conditional(
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::invalid_argument("bad request")) }
            },
            &config,
            is_retryable_error,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_retryable_error_tool_timeout() {
        assert!(is_retryable_error(&Error::tool_timeout("x")));
        assert!(!is_retryable_error(&Error::invalid_argument("x")));
        assert!(!is_retryable_error(&Error::Cancelled));
    }
}
