//! Lifecycle handler trait
//!
//! One implementation per resource type. Handlers drive the remote API and
//! write results into the context's desired instance; the engine dispatch
//! owns the uniform obligations around them (coercion, change-set
//! enforcement, reconcilers, read-after-write, diagnostics policy).

use crate::context::OperationContext;
use async_trait::async_trait;
use stratoform_client::ApiError;

/// Per-resource-type Create / Read / Update / Delete, plus an optional
/// import hook.
///
/// Contracts the engine relies on:
///
/// - `create` sets `ctx.desired.id` as soon as the remote assigns an
///   identifier, even when later steps may still fail; the engine keeps a
///   partially created id so the host can track the resource.
/// - `read` fetches by `ctx.desired.id` and rewrites
///   `ctx.desired.attributes` from the remote object, computed fields
///   included. A missing remote object is reported as a Gone error; the
///   engine translates that per verb.
/// - `update` patches only fields named in `ctx.change_set`. It is never
///   invoked when the change set requires replacement.
/// - `delete` issues the delete and, for asynchronous resources, waits for
///   the deleted state. Gone from the remote is success.
/// - Handlers must not touch tags, bindings or other sub-resources with
///   their own API paths; those belong to registered reconcilers so Update
///   can reuse them.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError>;
    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError>;
    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError>;
    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError>;

    /// Pre-read import hook.
    ///
    /// Runs after the import codec has parsed the given string into
    /// attributes and before the engine's Read. Implementations may resolve
    /// a secondary key (a name, say) into the real id and rewrite
    /// `ctx.desired.id`. The default accepts the parsed id as-is.
    async fn import(&self, _ctx: &mut OperationContext, _given: &str) -> Result<(), ApiError> {
        Ok(())
    }
}
