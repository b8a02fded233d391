//! Bounded retry with exponential backoff for transient model-call failures.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::error::InvocationError;

/// Attempt budgets for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Model invocations per stage, the first one included. A reply that fails
    /// validation (or a timed-out call) uses one attempt.
    pub max_attempts: u32,
    /// Extra tries for transport-level failures inside one attempt
    pub invocation_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            invocation_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let delay = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Run `operation`, retrying retryable [`InvocationError`]s with backoff up to
/// `policy.invocation_retries` times.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, InvocationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InvocationError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(retries = retry, "Model call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && retry < policy.invocation_retries => {
                retry += 1;
                let delay = policy.backoff(retry);
                warn!(
                    error = %err,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "Transient model error, backing off"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(8_000));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_a_bounded_number_of_times() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InvocationError::Transport("connection reset".into()))
        })
        .await;

        assert!(matches!(result, Err(InvocationError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeouts_are_not_retried_here() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InvocationError::Timeout(Duration::from_secs(1)))
        })
        .await;

        assert!(matches!(result, Err(InvocationError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
