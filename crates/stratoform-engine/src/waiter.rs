//! Long-running operation waiter
//!
//! Generic poller over an observation probe: call the probe after an
//! initial delay, then every `min_interval` until the observed state lands
//! in `target`, the timeout elapses, or an unlisted state shows up.
//! Cancellation is honored at every tick and reported as a timeout.

use serde_json::Value as Json;
use std::time::Duration;
use stratoform_client::ApiError;
use stratoform_core::Diagnostic;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// One probe result: the remote's status string plus the raw payload the
/// probe fetched, so callers can reuse it without a second read.
#[derive(Debug, Clone)]
pub struct Observation {
    pub state: String,
    pub payload: Json,
}

impl Observation {
    pub fn new(state: impl Into<String>, payload: Json) -> Self {
        Self {
            state: state.into(),
            payload,
        }
    }

    /// Observation for a remote that reports the object as absent. Delete
    /// waits list this as their target.
    pub fn deleted() -> Self {
        Self::new(Self::DELETED, Json::Null)
    }

    pub const DELETED: &'static str = "DELETED";
}

/// Terminal result of one wait.
#[derive(Debug)]
pub enum WaitOutcome {
    Reached(Observation),
    TimedOut { last: Option<Observation> },
    UnexpectedState { observation: Observation },
    ProbeError(ApiError),
}

impl WaitOutcome {
    /// Collapse into a result, rendering failures as error diagnostics.
    pub fn into_result(self, what: &str) -> Result<Observation, Diagnostic> {
        match self {
            WaitOutcome::Reached(obs) => Ok(obs),
            WaitOutcome::TimedOut { last } => {
                let last_state = last
                    .map(|o| o.state)
                    .unwrap_or_else(|| "(never observed)".to_string());
                Err(Diagnostic::error(format!("Timeout waiting for {}", what))
                    .with_detail(format!(
                        "timeout elapsed; last observed status: {}",
                        last_state
                    )))
            }
            WaitOutcome::UnexpectedState { observation } => {
                let reason = observation
                    .payload
                    .get("status_reason")
                    .and_then(Json::as_str)
                    .unwrap_or("no reason reported");
                Err(Diagnostic::error(format!(
                    "Unexpected state `{}` while waiting for {}",
                    observation.state, what
                ))
                .with_detail(reason.to_string()))
            }
            WaitOutcome::ProbeError(err) => {
                Err(err.to_diagnostic(format!("Failed probing {}", what)))
            }
        }
    }
}

impl WaitOutcome {
    /// Collapse into an [`ApiError`] for use inside handlers, which report
    /// remote failures upward and let dispatch render diagnostics.
    pub fn into_api_result(self, what: &str) -> Result<Observation, ApiError> {
        match self {
            WaitOutcome::Reached(obs) => Ok(obs),
            WaitOutcome::TimedOut { last } => {
                let last_state = last
                    .map(|o| o.state)
                    .unwrap_or_else(|| "(never observed)".to_string());
                Err(ApiError::new(
                    stratoform_core::ErrorKind::Unknown,
                    format!(
                        "timeout waiting for {}; last observed status: {}",
                        what, last_state
                    ),
                ))
            }
            WaitOutcome::UnexpectedState { observation } => {
                let reason = observation
                    .payload
                    .get("status_reason")
                    .and_then(Json::as_str)
                    .unwrap_or("no reason reported");
                Err(ApiError::new(
                    stratoform_core::ErrorKind::Unknown,
                    format!(
                        "unexpected state `{}` while waiting for {}: {}",
                        observation.state, what, reason
                    ),
                ))
            }
            WaitOutcome::ProbeError(err) => Err(err),
        }
    }
}

/// Pending/target state poller.
///
/// `pending` is informational: an observation in neither set surfaces as
/// [`WaitOutcome::UnexpectedState`] rather than being polled forever.
#[derive(Debug, Clone)]
pub struct StateWaiter {
    pending: Vec<String>,
    target: Vec<String>,
    timeout: Duration,
    min_interval: Duration,
    initial_delay: Duration,
}

impl StateWaiter {
    pub fn new<S: Into<String>>(
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            timeout: Duration::from_secs(600),
            min_interval: Duration::from_secs(10),
            initial_delay: Duration::ZERO,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Poll `probe` until a terminal outcome.
    ///
    /// The probe owns error mapping: a 404 that means "deletion finished"
    /// must be translated by the probe into [`Observation::deleted`], not
    /// surfaced as an error.
    pub async fn wait<F, Fut>(&self, cancel: &CancellationToken, mut probe: F) -> WaitOutcome
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Observation, ApiError>>,
    {
        let started = Instant::now();
        let mut last: Option<Observation> = None;

        if !self.initial_delay.is_zero()
            && !self.tick(cancel, self.initial_delay, started).await
        {
            return WaitOutcome::TimedOut { last };
        }

        loop {
            if started.elapsed() >= self.timeout {
                return WaitOutcome::TimedOut { last };
            }

            match probe().await {
                Ok(observation) => {
                    tracing::debug!(state = %observation.state, "waiter observation");
                    if self.target.iter().any(|t| t == &observation.state) {
                        return WaitOutcome::Reached(observation);
                    }
                    if !self.pending.iter().any(|p| p == &observation.state) {
                        return WaitOutcome::UnexpectedState { observation };
                    }
                    last = Some(observation);
                }
                Err(err) => return WaitOutcome::ProbeError(err),
            }

            if !self.tick(cancel, self.min_interval, started).await {
                return WaitOutcome::TimedOut { last };
            }
        }
    }

    /// Sleep one interval, bounded by the timeout and racing cancellation.
    /// Returns `false` when the wait must stop.
    async fn tick(&self, cancel: &CancellationToken, interval: Duration, started: Instant) -> bool {
        let remaining = self.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return false;
        }
        let nap = interval.min(remaining);
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(nap) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use stratoform_core::ErrorKind;

    fn fast_waiter(pending: &[&str], target: &[&str]) -> StateWaiter {
        StateWaiter::new(pending.to_vec(), target.to_vec())
            .timeout(Duration::from_millis(200))
            .min_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn reaches_target_after_pending() {
        let calls = AtomicU32::new(0);
        let waiter = fast_waiter(&["creating"], &["available"]);
        let outcome = waiter
            .wait(&CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Ok(Observation::new("creating", Json::Null))
                    } else {
                        Ok(Observation::new("available", Json::Null))
                    }
                }
            })
            .await;
        match outcome {
            WaitOutcome::Reached(obs) => assert_eq!(obs.state, "available"),
            other => panic!("expected Reached, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn times_out_with_last_observation() {
        let waiter = fast_waiter(&["creating"], &["available"]);
        let outcome = waiter
            .wait(&CancellationToken::new(), || async {
                Ok(Observation::new("creating", Json::Null))
            })
            .await;
        match outcome {
            WaitOutcome::TimedOut { last } => {
                assert_eq!(last.unwrap().state, "creating");
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }

        let diag = WaitOutcome::TimedOut {
            last: Some(Observation::new("creating", Json::Null)),
        }
        .into_result("vault creation")
        .unwrap_err();
        assert!(diag.detail.contains("timeout"));
        assert!(diag.detail.contains("creating"));
    }

    #[tokio::test]
    async fn unexpected_state_surfaces() {
        let waiter = fast_waiter(&["creating"], &["available"]);
        let outcome = waiter
            .wait(&CancellationToken::new(), || async {
                Ok(Observation::new(
                    "error",
                    serde_json::json!({"status_reason": "quota exceeded"}),
                ))
            })
            .await;
        match outcome {
            WaitOutcome::UnexpectedState { observation } => {
                assert_eq!(observation.state, "error");
                let diag = WaitOutcome::UnexpectedState { observation }
                    .into_result("vault creation")
                    .unwrap_err();
                assert!(diag.detail.contains("quota exceeded"));
            }
            other => panic!("expected UnexpectedState, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn probe_error_surfaces() {
        let waiter = fast_waiter(&["creating"], &["available"]);
        let outcome = waiter
            .wait(&CancellationToken::new(), || async {
                Err(ApiError::new(ErrorKind::Unauthorized, "token expired"))
            })
            .await;
        assert!(matches!(outcome, WaitOutcome::ProbeError(_)));
    }

    #[tokio::test]
    async fn cancellation_reports_timed_out() {
        let token = CancellationToken::new();
        token.cancel();
        let waiter = fast_waiter(&["creating"], &["available"]);
        let outcome = waiter
            .wait(&token, || async { Ok(Observation::new("creating", Json::Null)) })
            .await;
        assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));
    }

    #[tokio::test]
    async fn deleted_observation_is_a_target() {
        let waiter = fast_waiter(&["deleting"], &[Observation::DELETED]);
        let outcome = waiter
            .wait(&CancellationToken::new(), || async {
                // A probe mapping remote 404 to the deleted observation
                Ok(Observation::deleted())
            })
            .await;
        assert!(matches!(outcome, WaitOutcome::Reached(_)));
    }
}
