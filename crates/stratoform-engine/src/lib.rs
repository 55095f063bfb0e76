//! Stratoform resource reconciliation engine
//!
//! The per-resource state machine that maps desired state to observed
//! state, issues the minimal set of remote mutations to converge, and
//! waits on asynchronous long-running operations while surfacing
//! structured diagnostics.
//!
//! The host hands the engine a `(resource type, verb, prior, desired)`
//! tuple; the engine shapes inputs through `stratoform-core`, obtains
//! clients from `stratoform-client`, drives the type's
//! [`LifecycleHandler`], awaits terminal status with the [`StateWaiter`],
//! syncs sub-resources through registered reconcilers, and returns a
//! `(new state, diagnostics)` pair.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod import;
pub mod instance;
pub mod reconcile;
pub mod registry;
pub mod waiter;

// Re-exports
pub use context::OperationContext;
pub use dispatch::{Engine, OperationOutcome, OperationRequest};
pub use error::{EngineError, Result};
pub use handler::LifecycleHandler;
pub use import::ImportSpec;
pub use instance::ResourceInstance;
pub use reconcile::{delta, ReconcileItem, SubResourceReconciler};
pub use registry::{CustomDiff, ProviderRegistry, RegistryBuilder, ResourceTypeDescriptor};
pub use waiter::{Observation, StateWaiter, WaitOutcome};
