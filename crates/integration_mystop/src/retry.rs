//! Bounded retry with exponential backoff
//!
//! Only errors reporting [`Retryable::is_retryable`] are retried. Backoff
//! waits use `tokio::time::sleep`, so a pending retry never blocks the
//! runtime and paused-clock tests observe exact delays.
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_mystop::retry::{RetryPolicy, retry};
//!
//! let policy = RetryPolicy::default();
//! let body = retry(&policy, || async { transport.get_text(url).await }).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MyStopError;

/// Retry behavior for upstream requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry in milliseconds (default: 500ms)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay in milliseconds (default: 10000ms)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (default: 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Retries after the first attempt (default: 2, i.e. 3 attempts)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_initial_delay() -> u64 {
    500
}

const fn default_max_delay() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_retries() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy with custom parameters
    #[must_use]
    pub const fn new(initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64, max_retries: u32) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            max_retries,
        }
    }

    /// A policy that makes exactly one attempt
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new(0, 0, 1.0, 0)
    }

    /// Total number of attempts this policy allows
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (0-indexed)
    ///
    /// delay = initial_delay * multiplier^attempt, capped at max_delay
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = (self.initial_delay_ms as f64) * self.multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped_delay as u64)
    }
}

/// Errors that can be checked for retryability
pub trait Retryable {
    /// Returns true if the failed operation may succeed when repeated
    fn is_retryable(&self) -> bool;
}

impl Retryable for MyStopError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Final result of a retried operation plus attempt metadata
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The result of the last attempt
    pub result: Result<T, E>,
    /// Number of attempts made (1 = no retries)
    pub attempts: u32,
}

impl<T, E> RetryResult<T, E> {
    /// Convert to a plain `Result`, discarding metadata
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Execute an async operation, retrying retryable failures
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "Request succeeded after retries");
                }
                return RetryResult {
                    result: Ok(value),
                    attempts,
                };
            },
            Err(err) => {
                let retry_attempt = attempts - 1;

                if !err.is_retryable() {
                    return RetryResult {
                        result: Err(err),
                        attempts,
                    };
                }

                if retry_attempt >= policy.max_retries {
                    warn!(
                        attempts,
                        max_retries = policy.max_retries,
                        error = %err,
                        "Request failed after max retries"
                    );
                    return RetryResult {
                        result: Err(err),
                        attempts,
                    };
                }

                let delay = policy.delay_for_attempt(retry_attempt);
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                debug!(attempt = attempts, delay_ms, error = %err, "Request failed, retrying");

                tokio::time::sleep(delay).await;
            },
        }
    }
}

/// Execute an async operation with retries, returning only the result
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    with_retry(policy, operation).await.into_result()
}
