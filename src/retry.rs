//! Retry logic with exponential backoff
//!
//! This module provides the retry policy used for every file fetch. The delay
//! before retry `k` is a pure function of `k` ([`RetryPolicy::delay_for_attempt`]),
//! and waiting goes through a [`Sleeper`] so tests can record delays instead of
//! sleeping.
//!
//! # Example
//!
//! ```no_run
//! use repo_dl::config::RetryConfig;
//! use repo_dl::error::Error;
//! use repo_dl::retry::{RetryPolicy, TokioSleeper, download_with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::from_config(&RetryConfig::default());
//! let bytes = download_with_retry(&policy, &TokioSleeper, || async {
//!     // Your fetch here
//!     Ok::<_, Error>(b"hello".to_vec())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection errors, 5xx) should return `true`.
/// Permanent failures (not found, bad configuration, invalid paths) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                if let Some(status) = e.status() {
                    return is_transient_status(status.as_u16());
                }
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            Error::Http { status, .. } => is_transient_status(*status),
            Error::Timeout { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Not found is definitive
            Error::NotFound(_) => false,
            Error::Config { .. } => false,
            Error::Archive(_) => false,
            Error::TooLarge { .. } => false,
            Error::InvalidPath { .. } => false,
            // A truncated or garbled listing is usually a proxy hiccup
            Error::Serialization(_) => true,
            Error::Cancelled => false,
            Error::Other(_) => false,
        }
    }
}

/// Status codes worth retrying: server errors, throttling and GitHub's 403 rate limit.
fn is_transient_status(status: u16) -> bool {
    matches!(status, 403 | 408 | 429) || (500..=599).contains(&status)
}

/// Which failures consume the retry budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryScope {
    /// Every failure is retried until the budget is exhausted
    Always,
    /// Only errors whose [`IsRetryable::is_retryable`] is true are retried
    TransientOnly,
}

/// Retry budget and backoff curve for a single operation
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// Base delay
    pub initial_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub backoff_multiplier: f64,
    /// Randomize delays (capped at `max_delay`)
    pub jitter: bool,
    /// Which failures are retried
    pub scope: RetryScope,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            scope: if config.retry_not_found {
                RetryScope::Always
            } else {
                RetryScope::TransientOnly
            },
        }
    }

    /// Total number of attempts an always-failing operation receives
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `attempt` (1-based): `min(initial_delay * multiplier^attempt, max_delay)`.
    ///
    /// Non-decreasing in `attempt` and never above `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    pub(crate) fn should_retry<E: IsRetryable>(&self, error: &E) -> bool {
        match self.scope {
            RetryScope::Always => true,
            RetryScope::TransientOnly => error.is_retryable(),
        }
    }
}

/// Source of backoff waits
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Production [`Sleeper`] backed by the tokio timer
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs at most `policy.total_attempts()` times. Between attempts
/// the sleeper waits [`RetryPolicy::delay_for_attempt`] (jittered when enabled).
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn download_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt < policy.max_retries && policy.should_retry(&e) => {
                attempt += 1;

                let delay = policy.delay_for_attempt(attempt);
                let delay = if policy.jitter {
                    add_jitter(delay).min(policy.max_delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                sleeper.sleep(delay).await;
            }
            Err(e) => {
                if attempt >= policy.max_retries {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
