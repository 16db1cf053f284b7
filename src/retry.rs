//! # Network Retry Policy
//!
//! Bounded-retry wrapper applied to every external provider call. Failures
//! classified as transient (timeouts, resets, abrupt termination, low-level
//! socket errors) are retried up to a fixed bound with a fixed delay
//! between attempts; non-transient failures and exhausted retries propagate
//! unchanged. The policy is stateless and reentrant: it holds nothing but
//! its two tunables and may wrap any zero-argument async operation.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AppError;

/// Retry tunables. The defaults (3 attempts, 1s apart) match what the
/// provider endpoints tolerate without tripping their rate limits.
#[derive(Debug, Clone, Copy)]
pub struct NetworkRetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for NetworkRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl NetworkRetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// The loop is explicit (attempt counter, no recursion) so stack depth
    /// stays bounded and the retry budget is visible in one place.
    pub async fn run<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient failure, retrying"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }

        // Unreachable unless max_attempts is 0; treat that as exhaustion.
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal(format!("retry policy for '{}' ran zero attempts", label))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_passes_through() {
        let policy = NetworkRetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<u32, _> = policy.run("ok", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_until_success() {
        let policy = NetworkRetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::TransientNetwork("reset".into()))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let policy = NetworkRetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("bad-request", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Provider("unknown voice".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_propagate_last_error() {
        let policy = NetworkRetryPolicy::new(2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::TransientNetwork("timeout".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::TransientNetwork(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
