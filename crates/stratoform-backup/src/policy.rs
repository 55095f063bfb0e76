//! Backup policy and vault binding resources
//!
//! The policy itself is simple CRUD. The binding is its own resource with
//! both endpoints force-new; bind and unbind are idempotent remotely, so
//! re-applying a satisfied state is a no-op success.

use crate::api::BackupApi;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use stratoform_client::ApiError;
use stratoform_core::{Diagnostic, ErrorKind, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, OperationContext, ResourceTypeDescriptor,
};

pub const TYPE_NAME: &str = "stratus_backup_policy";
pub const BINDING_TYPE_NAME: &str = "stratus_backup_policy_binding";

pub fn schema() -> Schema {
    Schema::new()
        .field("name", FieldSpec::string().required())
        .field("enabled", FieldSpec::bool().optional().default_value(true))
        .field(
            "backup_cycle",
            FieldSpec::int()
                .optional()
                .default_value(24)
                .validate_with(|path, value| match value.as_int() {
                    Some(hours) if !(1..=720).contains(&hours) => {
                        vec![Diagnostic::error("Backup cycle must be 1..=720 hours")
                            .with_field(path.to_string())]
                    }
                    _ => vec![],
                }),
        )
        .field("retention_days", FieldSpec::int().optional().default_value(30))
        .field("region", FieldSpec::string().optional())
        .field("id", FieldSpec::string().computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(PolicyHandler))
        .with_importer(ImportSpec::simple())
}

pub struct PolicyHandler;

#[async_trait]
impl LifecycleHandler for PolicyHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let body = json!({
            "name": attrs.get_str("name").unwrap_or_default(),
            "enabled": attrs.get_bool("enabled").unwrap_or(true),
            "backup_cycle": attrs.get_int("backup_cycle").unwrap_or(24),
            "retention_days": attrs.get_int("retention_days").unwrap_or(30),
        });

        let api = BackupApi::new(ctx);
        let policy = api.create_policy(body).await?;
        tracing::info!(policy = %policy.name, id = %policy.id, "created backup policy");
        ctx.desired.set_id(policy.id);
        Ok(())
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = BackupApi::new(ctx);
        let policy = api.get_policy(&ctx.desired.id.clone()).await?;

        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", policy.name);
        attrs.set("enabled", policy.enabled);
        if let Some(cycle) = policy.backup_cycle {
            attrs.set("backup_cycle", cycle);
        }
        if let Some(days) = policy.retention_days {
            attrs.set("retention_days", days);
        }
        attrs.set("id", policy.id);
        Ok(())
    }

    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let change_set = ctx.change_set.clone().unwrap_or_default();
        let attrs = &ctx.desired.attributes;

        let mut patch = json!({});
        for field in ["name", "enabled", "backup_cycle", "retention_days"] {
            if !change_set.touches(field) {
                continue;
            }
            patch[field] = attrs
                .get_present(field)
                .map(|v| v.to_json())
                .unwrap_or(json!(null));
        }
        if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        let api = BackupApi::new(ctx);
        api.update_policy(&ctx.desired.id.clone(), patch).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = BackupApi::new(ctx);
        api.delete_policy(&ctx.desired.id.clone()).await
    }
}

// ── Vault ↔ policy binding ──────────────────────────────────────

pub fn binding_schema() -> Schema {
    Schema::new()
        .field("vault_id", FieldSpec::string().required().force_new())
        .field("policy_id", FieldSpec::string().required().force_new())
        .field("region", FieldSpec::string().optional())
        .field("id", FieldSpec::string().computed())
}

pub fn binding_descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(BINDING_TYPE_NAME, binding_schema(), Arc::new(BindingHandler))
        .with_importer(ImportSpec::path(vec!["vault_id", "policy_id"]))
}

pub struct BindingHandler;

impl BindingHandler {
    fn endpoints(ctx: &OperationContext) -> (String, String) {
        let attrs = &ctx.desired.attributes;
        (
            attrs.get_str("vault_id").unwrap_or_default().to_string(),
            attrs.get_str("policy_id").unwrap_or_default().to_string(),
        )
    }
}

#[async_trait]
impl LifecycleHandler for BindingHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let (vault_id, policy_id) = Self::endpoints(ctx);
        let api = BackupApi::new(ctx);
        api.bind_policy(&vault_id, &policy_id).await?;
        ctx.desired.set_id(format!("{}/{}", vault_id, policy_id));
        Ok(())
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let (vault_id, policy_id) = Self::endpoints(ctx);
        let api = BackupApi::new(ctx);
        let vault = api.get_vault(&vault_id).await?;

        // Bound state is projected from the vault object
        if vault.policy_id.as_deref() != Some(policy_id.as_str()) {
            return Err(ApiError::new(
                ErrorKind::Gone,
                format!("vault {} is not bound to policy {}", vault_id, policy_id),
            ));
        }

        let attrs = &mut ctx.desired.attributes;
        attrs.set("vault_id", vault_id.clone());
        attrs.set("policy_id", policy_id.clone());
        ctx.desired.set_id(format!("{}/{}", vault_id, policy_id));
        Ok(())
    }

    async fn update(&self, _ctx: &mut OperationContext) -> Result<(), ApiError> {
        // Both endpoints are force-new; the engine never routes an update
        // here
        Err(ApiError::new(
            ErrorKind::Unknown,
            "policy binding cannot be updated in place",
        ))
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let (vault_id, policy_id) = Self::endpoints(ctx);
        let api = BackupApi::new(ctx);
        api.unbind_policy(&vault_id, &policy_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_are_well_formed() {
        schema().check(TYPE_NAME).unwrap();
        binding_schema().check(BINDING_TYPE_NAME).unwrap();
    }

    #[test]
    fn binding_endpoints_force_new() {
        let spec = binding_schema();
        assert!(spec.get("vault_id").unwrap().force_new);
        assert!(spec.get("policy_id").unwrap().force_new);
    }

    #[test]
    fn cycle_validator_bounds() {
        let spec = schema();
        let validator = spec.get("backup_cycle").unwrap().validator.as_ref().unwrap();
        assert!(validator("backup_cycle", &stratoform_core::AttrValue::Int(24)).is_empty());
        assert_eq!(validator("backup_cycle", &stratoform_core::AttrValue::Int(0)).len(), 1);
        assert_eq!(validator("backup_cycle", &stratoform_core::AttrValue::Int(9999)).len(), 1);
    }
}
