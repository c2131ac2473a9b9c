//! Retry utilities with exponential backoff.
//!
//! Transient failures talking to the LLM gateway or a search backend are
//! retried with jittered exponential backoff; everything else (bad config,
//! a validation failure) is returned immediately.
//!
//! ```rust,no_run
//! use reasoning_engine::retry::{retry_with_backoff, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_secs(1));
//!
//! let result = retry_with_backoff(config, || async {
//!     Ok::<_, reasoning_engine::Error>(42)
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
    /// Random jitter added on top of the backoff delay, as a fraction (0.0-1.0).
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

/// Retry an async operation with exponential backoff, unconditionally.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    sleep(config.calculate_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other("retry failed with no error")))
}

/// Transient errors (network, timeout, 5xx) are retryable; configuration and
/// validation errors are not.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(e) => !e.is_status() || e.status().is_some_and(|s| s.is_server_error()),
        Error::LlmProvider { message, .. } => {
            message.contains("timeout")
                || message.contains("500")
                || message.contains("502")
                || message.contains("503")
                || message.contains("504")
        }
        Error::Storage(_) => true,
        Error::ToolExecution { .. } => true,
        Error::Config(_) => false,
        Error::Validation(_) => false,
        Error::WorkflowParse(_) => false,
        Error::ConversationNotFound(_) => false,
        Error::ClarificationRequired { .. } => false,
        Error::ClarificationMismatch(_) => false,
        Error::MaxConnectionsExceeded(_) => false,
        Error::Json(_) => false,
        Error::Other(_) => false,
    }
}

/// Retry, but bail immediately on a non-retryable error instead of burning
/// through every attempt on a failure that will never succeed.
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    config: RetryConfig,
    mut operation: F,
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
                if !is_retryable_error(&err) {
                    return Err(err);
                }
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    sleep(config.calculate_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other("retry failed with no error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn builder_sets_all_fields() {
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
    fn delay_grows_exponentially() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.0);

        let d0 = config.calculate_delay(0);
        let d1 = config.calculate_delay(1);
        let d2 = config.calculate_delay(2);
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let config = RetryConfig::new().with_max_attempts(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        let result = retry_with_backoff(config, move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            async { Ok::<i32, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        let result = retry_with_backoff(config, move || {
            let n = calls2.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::storage("transient"))
                } else {
                    Ok::<i32, Error>(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        let result = retry_with_backoff(config, move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::storage("down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn conditional_retry_bails_immediately_on_non_retryable() {
        let config = RetryConfig::new().with_max_attempts(5);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        let result = retry_with_backoff_conditional(config, move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::config("bad url")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classifies_retryable_kinds() {
        assert!(is_retryable_error(&Error::storage("x")));
        assert!(is_retryable_error(&Error::tool_execution("t", "x")));
        assert!(!is_retryable_error(&Error::config("x")));
        assert!(!is_retryable_error(&Error::validation(vec!["x".into()])));
    }
}
