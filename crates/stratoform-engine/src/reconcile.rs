//! Sub-resource reconcilers
//!
//! Tag sets, policy bindings, host attachments and other embedded
//! collections live on their own API paths with their own failure modes.
//! They are reconciled by registered [`SubResourceReconciler`]s after the
//! primary object exists (Create) or after the primary patch (Update),
//! never inline in a handler.

use crate::context::OperationContext;
use async_trait::async_trait;
use serde_json::Value as Json;
use stratoform_client::ApiError;
use stratoform_core::AttributeMap;

/// One element of a reconciled collection. Equality covers both the key
/// and the value, so a tag whose value changed shows up as remove+add.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileItem {
    pub key: String,
    pub value: Json,
}

impl ReconcileItem {
    pub fn new(key: impl Into<String>, value: Json) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// An item identified by key alone.
    pub fn keyed(key: impl Into<String>) -> Self {
        Self::new(key, Json::Null)
    }
}

/// Compute `(to_add, to_remove)` as `desired − prior` and `prior − desired`.
pub fn delta(
    prior: &[ReconcileItem],
    desired: &[ReconcileItem],
) -> (Vec<ReconcileItem>, Vec<ReconcileItem>) {
    let to_add = desired
        .iter()
        .filter(|item| !prior.contains(item))
        .cloned()
        .collect();
    let to_remove = prior
        .iter()
        .filter(|item| !desired.contains(item))
        .cloned()
        .collect();
    (to_add, to_remove)
}

/// Reconciles one embedded collection of a parent resource.
///
/// Implementations are idempotent: applying an empty delta, or re-applying
/// an already-satisfied add, is a no-op success.
#[async_trait]
pub trait SubResourceReconciler: Send + Sync {
    fn name(&self) -> &str;

    /// Items implied by an attribute map. Used on prior and desired state
    /// to compute the delta.
    fn items(&self, attrs: &AttributeMap) -> Vec<ReconcileItem>;

    /// Items observed on the remote right now. Consulted when there is no
    /// prior state (Create) so pre-existing remote items are not re-added.
    async fn current(&self, ctx: &OperationContext) -> Result<Vec<ReconcileItem>, ApiError>;

    /// Apply both deltas in one call. Adds are applied before removes so
    /// capacity-constrained collections do not overflow mid-replacement.
    async fn apply(
        &self,
        ctx: &OperationContext,
        to_add: &[ReconcileItem],
        to_remove: &[ReconcileItem],
    ) -> Result<(), ApiError>;
}

/// Drive one reconciler for the current operation.
///
/// Prior items come from the prior instance when one exists, otherwise
/// from the remote. `apply` is called exactly once, and only when a delta
/// exists.
pub(crate) async fn run_reconciler(
    reconciler: &dyn SubResourceReconciler,
    ctx: &OperationContext,
) -> Result<(), ApiError> {
    let prior_items = match &ctx.prior {
        Some(prior) => reconciler.items(&prior.attributes),
        None => reconciler.current(ctx).await?,
    };
    let desired_items = reconciler.items(&ctx.desired.attributes);
    let (to_add, to_remove) = delta(&prior_items, &desired_items);

    if to_add.is_empty() && to_remove.is_empty() {
        tracing::debug!(reconciler = reconciler.name(), "no sub-resource delta");
        return Ok(());
    }

    tracing::info!(
        reconciler = reconciler.name(),
        add = to_add.len(),
        remove = to_remove.len(),
        "reconciling sub-resources"
    );
    reconciler.apply(ctx, &to_add, &to_remove).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_splits_add_and_remove() {
        let prior = vec![
            ReconcileItem::new("a", json!("1")),
            ReconcileItem::new("b", json!("2")),
        ];
        let desired = vec![
            ReconcileItem::new("b", json!("2")),
            ReconcileItem::new("c", json!("3")),
        ];
        let (to_add, to_remove) = delta(&prior, &desired);
        assert_eq!(to_add, vec![ReconcileItem::new("c", json!("3"))]);
        assert_eq!(to_remove, vec![ReconcileItem::new("a", json!("1"))]);
    }

    #[test]
    fn changed_value_is_remove_plus_add() {
        let prior = vec![ReconcileItem::new("a", json!("1"))];
        let desired = vec![ReconcileItem::new("a", json!("2"))];
        let (to_add, to_remove) = delta(&prior, &desired);
        assert_eq!(to_add.len(), 1);
        assert_eq!(to_remove.len(), 1);
    }

    #[test]
    fn empty_delta_for_equal_sets() {
        let items = vec![ReconcileItem::keyed("a"), ReconcileItem::keyed("b")];
        let (to_add, to_remove) = delta(&items, &items.clone());
        assert!(to_add.is_empty());
        assert!(to_remove.is_empty());
    }
}
