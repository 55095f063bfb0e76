//! Backup vault resource
//!
//! Vault provisioning is asynchronous: the create call returns a vault in
//! `creating` and the handler waits for `available`. Deletion waits for
//! the object to disappear. The tag set is a reconciled sub-resource on
//! its own batch path.

use crate::api::{
    BackupApi, STATUS_AVAILABLE, STATUS_CREATING, STATUS_DELETING, STATUS_ERROR,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stratoform_client::ApiError;
use stratoform_core::{AttrValue, AttributeMap, FieldKind, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, Observation, OperationContext, ReconcileItem,
    ResourceTypeDescriptor, StateWaiter, SubResourceReconciler,
};

pub const TYPE_NAME: &str = "stratus_backup_vault";

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub fn schema() -> Schema {
    Schema::new()
        .field("name", FieldSpec::string().required())
        .field("description", FieldSpec::string().optional())
        .field("size", FieldSpec::int().optional().default_value(100))
        .field(
            "keep_policy",
            FieldSpec::bool()
                .optional()
                .default_value(false)
                .describe("Keep the bound policy when the vault is deleted"),
        )
        .field("tags", FieldSpec::map(FieldKind::String).optional())
        .field("region", FieldSpec::string().optional().force_new())
        .field("id", FieldSpec::string().computed())
        .field("status", FieldSpec::string().computed())
        .field("policy_id", FieldSpec::string().computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(VaultHandler))
        .with_reconciler(Arc::new(VaultTagReconciler))
        .with_importer(ImportSpec::simple())
}

pub struct VaultHandler;

impl VaultHandler {
    fn write_attrs(ctx: &mut OperationContext, vault: crate::api::VaultPayload) {
        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", vault.name);
        if let Some(description) = vault.description {
            attrs.set("description", description);
        }
        if let Some(size) = vault.size {
            attrs.set("size", size);
        }
        let mut tags = std::collections::BTreeMap::new();
        for tag in vault.tags {
            tags.insert(tag.key, AttrValue::String(tag.value));
        }
        attrs.set("tags", AttrValue::Map(tags));
        attrs.set("status", vault.status);
        if let Some(policy_id) = vault.policy_id {
            attrs.set("policy_id", policy_id);
        }
        attrs.set("id", vault.id);
    }

    async fn wait_available(ctx: &OperationContext, id: &str) -> Result<(), ApiError> {
        let api = BackupApi::new(ctx);
        let waiter = StateWaiter::new(
            vec![STATUS_CREATING, STATUS_DELETING],
            vec![STATUS_AVAILABLE],
        )
        .timeout(ctx.wait_budget(Duration::from_secs(600)))
        .min_interval(POLL_INTERVAL);

        waiter
            .wait(ctx.cancel_token(), || {
                let api = api.clone();
                let id = id.to_string();
                async move {
                    let vault = api.get_vault(&id).await?;
                    if vault.status == STATUS_ERROR {
                        // Terminal; surface the remote reason instead of
                        // polling into the timeout
                        return Ok(Observation::new(
                            STATUS_ERROR,
                            json!({"status_reason": vault.status_reason}),
                        ));
                    }
                    Ok(Observation::new(vault.status.clone(), json!({})))
                }
            })
            .await
            .into_api_result("vault to become available")
            .map(|_| ())
    }
}

#[async_trait]
impl LifecycleHandler for VaultHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let mut body = json!({
            "name": attrs.get_str("name").unwrap_or_default(),
            "size": attrs.get_int("size").unwrap_or(100),
        });
        if let Some(description) = attrs.get_str("description") {
            body["description"] = json!(description);
        }

        let api = BackupApi::new(ctx);
        let vault = api.create_vault(body).await?;
        tracing::info!(vault = %vault.name, id = %vault.id, "created backup vault");
        ctx.desired.set_id(vault.id.clone());

        Self::wait_available(ctx, &vault.id).await
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = BackupApi::new(ctx);
        let vault = api.get_vault(&ctx.desired.id.clone()).await?;
        Self::write_attrs(ctx, vault);
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
        if change_set.touches("size") {
            patch["size"] = json!(attrs.get_int("size").unwrap_or(100));
        }
        if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        let id = ctx.desired.id.clone();
        let api = BackupApi::new(ctx);
        api.update_vault(&id, patch).await?;
        ctx.check_cancelled()?;
        Self::wait_available(ctx, &id).await
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let id = ctx.desired.id.clone();
        let keep_policy = ctx
            .desired
            .attributes
            .get_bool("keep_policy")
            .unwrap_or(false);

        let api = BackupApi::new(ctx);
        api.delete_vault(&id, keep_policy).await?;

        let waiter = StateWaiter::new(
            vec![STATUS_DELETING, STATUS_AVAILABLE],
            vec![Observation::DELETED],
        )
        .timeout(ctx.wait_budget(Duration::from_secs(600)))
        .min_interval(POLL_INTERVAL);

        waiter
            .wait(ctx.cancel_token(), || {
                let api = api.clone();
                let id = id.clone();
                async move {
                    match api.get_vault(&id).await {
                        Ok(vault) => Ok(Observation::new(vault.status, json!({}))),
                        // Gone is the target observation for a delete wait
                        Err(err) if err.is_gone() => Ok(Observation::deleted()),
                        Err(err) => Err(err),
                    }
                }
            })
            .await
            .into_api_result("vault deletion")
            .map(|_| ())
    }
}

/// Vault tag set, reconciled through the batch tag path.
pub struct VaultTagReconciler;

fn pairs(items: &[ReconcileItem]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|item| {
            (
                item.key.clone(),
                item.value.as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[async_trait]
impl SubResourceReconciler for VaultTagReconciler {
    fn name(&self) -> &str {
        "tags"
    }

    fn items(&self, attrs: &AttributeMap) -> Vec<ReconcileItem> {
        match attrs.get_present("tags") {
            Some(AttrValue::Map(map)) => map
                .iter()
                .map(|(k, v)| ReconcileItem::new(k.clone(), v.to_json()))
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn current(&self, ctx: &OperationContext) -> Result<Vec<ReconcileItem>, ApiError> {
        let api = BackupApi::new(ctx);
        let vault = api.get_vault(&ctx.desired.id).await?;
        Ok(vault
            .tags
            .into_iter()
            .map(|tag| ReconcileItem::new(tag.key, json!(tag.value)))
            .collect())
    }

    async fn apply(
        &self,
        ctx: &OperationContext,
        to_add: &[ReconcileItem],
        to_remove: &[ReconcileItem],
    ) -> Result<(), ApiError> {
        let api = BackupApi::new(ctx);
        let vault_id = &ctx.desired.id;
        // Adds first so a replaced tag never leaves the set empty
        if !to_add.is_empty() {
            api.add_tags(vault_id, &pairs(to_add)).await?;
        }
        if !to_remove.is_empty() {
            api.remove_tags(vault_id, &pairs(to_remove)).await?;
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
    fn keep_policy_defaults_false() {
        let spec = schema();
        let field = spec.get("keep_policy").unwrap();
        assert_eq!(field.default, Some(AttrValue::Bool(false)));
    }

    #[test]
    fn region_forces_replacement() {
        assert!(schema().get("region").unwrap().force_new);
    }

    #[test]
    fn tag_items_from_map() {
        let mut attrs = AttributeMap::new();
        let mut map = std::collections::BTreeMap::new();
        map.insert("env".to_string(), AttrValue::String("prod".to_string()));
        attrs.set("tags", AttrValue::Map(map));
        let items = VaultTagReconciler.items(&attrs);
        assert_eq!(items, vec![ReconcileItem::new("env", json!("prod"))]);
    }
}
