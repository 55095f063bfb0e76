//! Capped exponential backoff for retryable remote failures
//!
//! Only Throttled and Transient errors are re-issued; everything else
//! surfaces immediately. Exhausting the per-call budget promotes the
//! original error with the retry history appended to its message.

use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff knobs for one remote call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; used for calls with their own waiter.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Fast knobs for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    /// Delay before retry number `attempt` (zero-based), capped doubling.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Run `op`, retrying retryable failures under `policy`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut history: Vec<String> = Vec::new();

    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    kind = %err.kind,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying remote call"
                );
                history.push(format!(
                    "attempt {}: {} ({}ms backoff)",
                    attempt + 1,
                    err.message,
                    delay.as_millis()
                ));
                sleep(delay).await;
            }
            Err(mut err) => {
                if !history.is_empty() {
                    err.message = format!(
                        "{} (gave up after {} attempts; {})",
                        err.message,
                        attempt + 1,
                        history.join("; ")
                    );
                }
                return Err(err);
            }
        }
    }

    // max_attempts is at least 1, so the loop always returns
    unreachable!("retry loop exited without a result")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use stratoform_core::ErrorKind;

    fn throttle() -> ApiError {
        ApiError::new(ErrorKind::Throttled, "slow down").with_status(429)
    }

    #[test]
    fn delay_is_capped_doubling() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(4), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(throttle())
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(4), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::new(ErrorKind::InvalidInput, "bad field")) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidInput);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_appends_history() {
        let result: Result<(), _> =
            with_retry(&RetryPolicy::immediate(3), || async { Err(throttle()) }).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Throttled);
        assert!(err.message.contains("gave up after 3 attempts"));
        assert!(err.message.contains("attempt 1"));
    }
}
