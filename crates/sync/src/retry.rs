//! Retry with exponential backoff
//!
//! Backend calls can fail transiently. [`with_retry`] re-runs an operation
//! while its failure kind is retryable, sleeping
//! `min(base_delay * backoff_factor^(attempt - 1), max_delay)` between
//! attempts. Validation errors are never retried.

use std::future::Future;
use std::time::Duration;

use modvote_core::{Error, ErrorKind, Result, RetrySettings};
use tracing::{debug, warn};

/// Retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryOptions {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_factor: settings.backoff_factor,
            retryable_kinds: settings.retryable_kinds.clone(),
        }
    }
}

impl RetryOptions {
    /// Delay after the given failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(delay_ms.min(max_ms) as u64)
    }

    /// Whether a failure is worth another attempt
    pub fn is_retryable(&self, error: &Error) -> bool {
        match error.kind() {
            Some(kind) => self.retryable_kinds.contains(&kind),
            // Validation and local errors are terminal
            None => false,
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or runs out of attempts
pub async fn with_retry<T, F, Fut>(mut operation: F, label: &str, options: &RetryOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !options.is_retryable(&e) => {
                debug!(label, attempt, error = %e, "Terminal failure, not retrying");
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(label, attempts = attempt, error = %e, "Retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = options.delay_for_attempt(attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
