//! Retry policy: exponential backoff around a fallible async operation.
//!
//! Retry is deliberately orthogonal to timeout: the timeout bounds one
//! attempt, the policy governs how many attempts happen. Operations are
//! retried whole; no partial state crosses attempts.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Backoff schedule for a retried operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Must be >= 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub factor: f64,
    /// When set, each delay is scaled by a random factor in [0.5, 1.0)
    /// to spread retries from concurrent workers.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            factor: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let mut millis = self.base_delay.as_millis() as f64 * exp;
        if self.jitter {
            millis *= 0.5 + rand::random::<f64>() * 0.5;
        }
        Duration::from_millis(millis as u64)
    }
}

/// Run `op` until it succeeds or the attempt budget is exhausted,
/// returning the last error. Errors reporting themselves non-retryable
/// via `is_retryable` short-circuit immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, crate::FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, crate::FetchError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !e.is_retryable() || attempt == attempts {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "fetch attempt failed, backing off"
                );
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
        }
    }

    // Unreachable with attempts >= 1, but keep the compiler honest.
    Err(last_err.unwrap_or(crate::FetchError::Transport("retry budget empty".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tiny(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            factor: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&tiny(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FetchError::Transport("down".to_string()))
            } else {
                Ok(42u32)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&tiny(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Timeout {
                elapsed: Duration::from_secs(8),
            })
        })
        .await;
        assert!(matches!(result, Err(FetchError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&tiny(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                status: 404,
                body: "nope".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_by_factor() {
        let p = tiny(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(1));
        assert_eq!(p.delay_for(2), Duration::from_millis(2));
        assert_eq!(p.delay_for(3), Duration::from_millis(4));
    }

    #[test]
    fn jitter_stays_below_nominal_delay() {
        let p = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            jitter: true,
        };
        for _ in 0..50 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(200));
        }
    }
}
