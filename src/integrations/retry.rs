//! Retry for external API calls
//!
//! Wraps a fallible async call and re-runs it, a fixed delay apart, while the
//! error is classified as transient.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    /// Delay before each retry
    pub delay: Duration,
}

impl RetryConfig {
    /// `max_attempts` tries in total, `delay` apart
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_retries: max_attempts.saturating_sub(1),
            delay,
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Retry classification for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation
    Retry,
    /// Don't retry, the error is permanent
    NoRetry,
}

/// Trait for errors that can indicate whether to retry
pub trait RetryableError {
    /// Determine if this error should be retried
    fn retry_decision(&self) -> RetryDecision;
}

/// Classify an HTTP status: rate limits and server errors are transient
pub fn decision_for_status(status: u16) -> RetryDecision {
    match status {
        429 | 500..=599 => RetryDecision::Retry,
        _ => RetryDecision::NoRetry,
    }
}

/// Execute an async operation with retry logic
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name for logging purposes
/// * `operation` - The async operation to execute
///
/// # Returns
/// The result of the operation, or the last error if all retries failed
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => match e.retry_decision() {
                RetryDecision::NoRetry => {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation failed with non-retryable error: {}",
                        e
                    );
                    return Err(e);
                }
                RetryDecision::Retry => {
                    if attempt >= config.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation failed after {} attempts: {}",
                            attempt + 1,
                            e
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts(),
                        delay_secs = config.delay.as_secs_f64(),
                        "Retrying after error: {}",
                        e
                    );

                    sleep(config.delay).await;
                    attempt += 1;
                }
            },
        }
    }
}
