//! Resilience patterns for Calrissian
//!
//! Provisioning calls against the cluster are wrapped in an explicit retry
//! policy: a bounded number of attempts, a backoff between them and a
//! predicate deciding which failures are worth another attempt.

pub mod backoff;
pub mod retry;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
