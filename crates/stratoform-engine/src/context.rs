//! Per-invocation operation context
//!
//! Everything a handler call receives: the client factory (with its
//! context-confined cache), the resolved region, prior and desired
//! instances, the change set, the operation deadline and the cancellation
//! signal. Contexts are built fresh per top-level invocation and never
//! shared.

use crate::instance::ResourceInstance;
use std::sync::Arc;
use std::time::Duration;
use stratoform_client::{ApiClient, ApiError, ClientFactory, RetryPolicy};
use stratoform_core::{ChangeSet, Diagnostics, ErrorKind, OperationVerb};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct OperationContext {
    pub factory: Arc<ClientFactory>,
    pub region: String,
    pub verb: OperationVerb,
    pub desired: ResourceInstance,
    pub prior: Option<ResourceInstance>,
    pub change_set: Option<ChangeSet>,
    /// Warnings handlers want surfaced without aborting
    pub warnings: Diagnostics,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl OperationContext {
    pub fn new(
        factory: Arc<ClientFactory>,
        verb: OperationVerb,
        desired: ResourceInstance,
        prior: Option<ResourceInstance>,
        cancel: CancellationToken,
    ) -> Self {
        // Region from the resource attribute when present, provider default
        // otherwise.
        let region = desired
            .attributes
            .get_str("region")
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| factory.default_region().to_string());

        let deadline = desired
            .timeouts
            .budget(verb)
            .map(|budget| Instant::now() + budget);

        Self {
            factory,
            region,
            verb,
            desired,
            prior,
            change_set: None,
            warnings: Diagnostics::new(),
            deadline,
            cancel,
        }
    }

    /// Service client bound to this context's region.
    pub fn client(&self, service: &str, version: &str) -> Arc<ApiClient> {
        self.factory.client(service, version, Some(&self.region))
    }

    /// The backoff policy for remote calls in this context.
    pub fn retry(&self) -> &RetryPolicy {
        self.factory.retry()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Budget left before the operation deadline; `None` is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cap `wanted` by the remaining operation budget.
    ///
    /// A handler may perform several waits in sequence; each consumes a
    /// portion of the per-verb budget.
    pub fn wait_budget(&self, wanted: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => wanted.min(remaining),
            None => wanted,
        }
    }

    /// Cooperative cancellation check; handlers call this at least between
    /// remote API calls.
    pub fn check_cancelled(&self) -> Result<(), ApiError> {
        if self.cancel.is_cancelled() {
            Err(ApiError::new(
                ErrorKind::Unknown,
                "operation cancelled by host",
            ))
        } else {
            Ok(())
        }
    }

    pub fn warn(&mut self, diag: stratoform_core::Diagnostic) {
        self.warnings.push(diag);
    }
}
