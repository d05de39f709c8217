//! Retry logic with Fibonacci backoff for API calls
//!
//! The policy is a plain value handed to the fetcher, so the schedule and
//! the retryable-error predicate can be tested without any network.

use crate::fetch::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Unit of the Fibonacci schedule (1, 1, 2, 3, 5, ... times this)
    pub base_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,

    /// Decides whether an error is worth another attempt
    pub retryable: fn(&FetchError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            retryable: FetchError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let (mut previous, mut current) = (0u32, 1u32);
        for _ in 1..retry {
            let next = previous.saturating_add(current);
            previous = current;
            current = next;
        }

        self.base_delay
            .checked_mul(current)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_retryable(&self, error: &FetchError) -> bool {
        (self.retryable)(error)
    }
}

/// Executes an async operation under a retry policy
///
/// Returns the first success, the first non-retryable error, or the last
/// error once all attempts are used up.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{}: succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt < max_attempts && policy.is_retryable(&e) => {
                let delay = policy.delay_for_retry(attempt);
                warn!(
                    "{}: backing off {:?} after attempt {}/{}: {}",
                    operation_name, delay, attempt, max_attempts, e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
