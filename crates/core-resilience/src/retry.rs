//! Retry with exponential backoff, driven by error classification
//!
//! An operation is attempted, and on failure its error is classified. The
//! failure is retried only when the classification is retryable *and* its
//! category is in the configured retryable set. Delays grow as
//! `base_delay * backoff_multiplier^(attempt - 1)`, capped at `max_delay`.
//!
//! # Example
//!
//! ```no_run
//! use surreal_core_resilience::retry::{retry_with_backoff, RetryConfig};
//! use surreal_core_resilience::ResilienceError;
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let config = RetryConfig::default();
//! let value = retry_with_backoff(
//!     || async { Ok::<_, std::io::Error>(42) },
//!     &config,
//!     "fetch answer",
//! )
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use crate::classifier::{classify, ErrorCategory};
use crate::error::ResilienceError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
    /// Categories eligible for retry
    pub retryable_categories: Vec<ErrorCategory>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            retryable_categories: vec![
                ErrorCategory::Connection,
                ErrorCategory::Timeout,
                ErrorCategory::RateLimit,
                ErrorCategory::System,
            ],
        }
    }
}

impl RetryConfig {
    /// Policy used when opening connections: only transport-level failures retry
    pub fn for_connections(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            retryable_categories: vec![
                ErrorCategory::Connection,
                ErrorCategory::Timeout,
                ErrorCategory::System,
            ],
            ..Default::default()
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(0.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let cap = self.max_delay.as_millis() as f64;

        if !millis.is_finite() || millis >= cap {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    fn allows(&self, category: ErrorCategory) -> bool {
        self.retryable_categories.contains(&category)
    }
}

/// Run `operation`, retrying classified-retryable failures with backoff
///
/// Failures surface as [`ResilienceError::OperationFailed`], which carries the
/// classification and the number of attempts; the original error is its
/// `source()`.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T, ResilienceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                let classification = classify(&error)
                    .with_context("operation", context)
                    .with_context("attempt", attempt);

                let retry = attempt <= config.max_retries
                    && classification.retryable
                    && config.allows(classification.category);

                if !retry {
                    debug!(
                        context,
                        attempt,
                        category = %classification.category,
                        "giving up on operation"
                    );
                    return Err(ResilienceError::OperationFailed {
                        context: context.to_string(),
                        attempts: attempt,
                        classification,
                        source: Box::new(error),
                    });
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    context,
                    attempt,
                    max_retries = config.max_retries,
                    category = %classification.category,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
