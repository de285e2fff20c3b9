//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    pub backoff_strategy: BackoffStrategy,

    /// Whether to add jitter to retry delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(10, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Fixed number of attempts with a constant sleep between them
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        }
    }

    /// Exponential backoff for calls against a struggling API server
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_strategy: BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
        }
    }

    /// Calculate delay for a specific attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.initial_delay,
            self.max_delay,
            self.jitter,
        )
        .calculate_delay(attempt)
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;

    /// Custom retry delay for this error
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

/// Runs an operation until it succeeds, fails for good, or the policy runs
/// out of attempts
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!("Giving up on attempt {}: {}", attempt, error);
                return Err(RetryError::NonRetryableError(error));
            }
            if attempt >= max_attempts {
                warn!("All {} attempts failed, last error: {}", attempt, error);
                return Err(RetryError::MaxAttemptsExceeded {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = error
                .retry_delay()
                .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));
            debug!(
                "Attempt {}/{} failed ({}), next one in {:?}",
                attempt, max_attempts, error, delay
            );
            sleep(delay).await;
        }
    }
}

/// Why a retried operation ultimately failed
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),
}

impl<E> RetryError<E> {
    /// The error of the final attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => last_error,
            RetryError::NonRetryableError(error) => error,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::MaxAttemptsExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Stand-in for an API server answer
    #[derive(Debug)]
    struct ApiStatus(u16);

    impl std::fmt::Display for ApiStatus {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "HTTP {}", self.0)
        }
    }

    impl Retryable for ApiStatus {
        fn is_retryable(&self) -> bool {
            self.0 == 404 || self.0 >= 500
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_resource_is_visible() {
        let calls = Cell::new(0);
        let executor = RetryExecutor::new(RetryPolicy::fixed(3, Duration::from_secs(5)));
        let started = tokio::time::Instant::now();

        let result = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                let seen = calls.get();
                async move {
                    if seen < 3 {
                        Err(ApiStatus(404))
                    } else {
                        Ok("visible")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "visible");
        assert_eq!(calls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(2, Duration::from_secs(1)));

        let result: Result<(), _> = executor.execute(|| async { Err(ApiStatus(503)) }).await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert!(matches!(err, RetryError::MaxAttemptsExceeded { attempts: 2, .. }));
        assert_eq!(err.into_inner().0, 503);
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let calls = Cell::new(0);
        let executor = RetryExecutor::new(RetryPolicy::default());

        let result: Result<(), _> = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async { Err(ApiStatus(403)) }
            })
            .await;

        assert!(matches!(result.unwrap_err(), RetryError::NonRetryableError(ApiStatus(403))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_default_policy_is_fixed() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_from_yaml() {
        let policy: RetryPolicy = serde_yaml::from_str(
            "max_attempts: 4\ninitial_delay: 500ms\nmax_delay: 8s\nbackoff_strategy:\n  type: exponential\n  base: 2.0\njitter: false\n",
        )
        .unwrap();
        assert_eq!(
            policy,
            RetryPolicy {
                jitter: false,
                ..RetryPolicy::exponential(4, Duration::from_millis(500), Duration::from_secs(8))
            }
        );
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
    }
}
