//! Identity group resource with membership binding
//!
//! The `users` set is a reconciled sub-resource: membership lives on its
//! own API path and bind/unbind are idempotent, so convergence is
//! add-the-missing then remove-the-extra.

use crate::api::IdentityApi;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use stratoform_client::ApiError;
use stratoform_core::{AttrValue, AttributeMap, FieldKind, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, OperationContext, ReconcileItem, ResourceTypeDescriptor,
    SubResourceReconciler,
};

pub const TYPE_NAME: &str = "stratus_identity_group";

pub fn schema() -> Schema {
    Schema::new()
        .field("name", FieldSpec::string().required())
        .field("description", FieldSpec::string().optional())
        .field("users", FieldSpec::set(FieldKind::String).optional())
        .field("region", FieldSpec::string().optional())
        .field("id", FieldSpec::string().computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(GroupHandler))
        .with_reconciler(Arc::new(MembershipReconciler))
        .with_importer(ImportSpec::simple())
}

pub struct GroupHandler;

#[async_trait]
impl LifecycleHandler for GroupHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let mut body = json!({
            "name": attrs.get_str("name").unwrap_or_default(),
        });
        if let Some(description) = attrs.get_str("description") {
            body["description"] = json!(description);
        }

        let api = IdentityApi::new(ctx);
        let group = api.create_group(body).await?;
        tracing::info!(group = %group.name, id = %group.id, "created identity group");
        ctx.desired.set_id(group.id);
        Ok(())
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = IdentityApi::new(ctx);
        let id = ctx.desired.id.clone();
        let group = api.get_group(&id).await?;
        let members = api.list_members(&id).await?;

        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", group.name);
        if let Some(description) = group.description {
            attrs.set("description", description);
        }
        attrs.set(
            "users",
            AttrValue::Set(members.into_iter().map(AttrValue::String).collect()),
        );
        attrs.set("id", group.id);
        Ok(())
    }

    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let change_set = ctx.change_set.clone().unwrap_or_default();
        let attrs = &ctx.desired.attributes;

        let mut patch = json!({});
        if change_set.touches("name") {
            patch["name"] = json!(attrs.get_str("name").unwrap_or_default());
        }
        if change_set.touches("description") {
            patch["description"] = json!(attrs.get_str("description").unwrap_or_default());
        }
        if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            // Membership-only change; the reconciler handles it
            return Ok(());
        }

        let api = IdentityApi::new(ctx);
        api.update_group(&ctx.desired.id.clone(), patch).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = IdentityApi::new(ctx);
        api.delete_group(&ctx.desired.id.clone()).await
    }
}

/// Membership binding: `unbound → binding → bound → unbinding → unbound`,
/// with both transitions idempotent remotely.
pub struct MembershipReconciler;

#[async_trait]
impl SubResourceReconciler for MembershipReconciler {
    fn name(&self) -> &str {
        "membership"
    }

    fn items(&self, attrs: &AttributeMap) -> Vec<ReconcileItem> {
        match attrs.get_present("users") {
            Some(AttrValue::Set(users)) => users
                .iter()
                .filter_map(AttrValue::as_str)
                .map(ReconcileItem::keyed)
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn current(&self, ctx: &OperationContext) -> Result<Vec<ReconcileItem>, ApiError> {
        let api = IdentityApi::new(ctx);
        let members = api.list_members(&ctx.desired.id).await?;
        Ok(members.into_iter().map(ReconcileItem::keyed).collect())
    }

    async fn apply(
        &self,
        ctx: &OperationContext,
        to_add: &[ReconcileItem],
        to_remove: &[ReconcileItem],
    ) -> Result<(), ApiError> {
        let api = IdentityApi::new(ctx);
        let group_id = ctx.desired.id.clone();
        for item in to_add {
            api.add_member(&group_id, &item.key).await?;
        }
        for item in to_remove {
            api.remove_member(&group_id, &item.key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_well_formed() {
        schema().check(TYPE_NAME).unwrap();
    }

    #[test]
    fn membership_items_come_from_users_set() {
        let mut attrs = AttributeMap::new();
        attrs.set(
            "users",
            AttrValue::Set(vec!["u1".into(), "u2".into()]),
        );
        let items = MembershipReconciler.items(&attrs);
        assert_eq!(items.len(), 2);
        assert!(items.contains(&ReconcileItem::keyed("u1")));
    }

    #[test]
    fn absent_users_set_means_no_items() {
        let attrs = AttributeMap::new();
        assert!(MembershipReconciler.items(&attrs).is_empty());
    }
}
