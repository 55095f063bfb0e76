//! WAF policy rule resource
//!
//! Rules are children of a policy; their composite identifier for import
//! is `policy_id/rule_id`.

use crate::api::WafApi;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use stratoform_client::ApiError;
use stratoform_core::{Diagnostic, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, OperationContext, ResourceTypeDescriptor,
};

pub const TYPE_NAME: &str = "stratus_waf_rule";

pub fn schema() -> Schema {
    Schema::new()
        .field("policy_id", FieldSpec::string().required().force_new())
        .field("name", FieldSpec::string().required())
        .field(
            "action",
            FieldSpec::string()
                .optional()
                .default_value("block")
                .validate_with(|path, value| match value.as_str() {
                    Some("block") | Some("allow") | Some("log") | None => vec![],
                    Some(other) => vec![Diagnostic::error(format!(
                        "Unknown rule action `{}`",
                        other
                    ))
                    .with_detail("expected one of: block, allow, log")
                    .with_field(path.to_string())],
                }),
        )
        .field(
            "priority",
            FieldSpec::int()
                .optional()
                .default_value(50)
                .validate_with(|path, value| match value.as_int() {
                    Some(p) if !(0..=100).contains(&p) => {
                        vec![Diagnostic::error("Priority must be 0..=100")
                            .with_field(path.to_string())]
                    }
                    _ => vec![],
                }),
        )
        .field("url", FieldSpec::string().optional())
        .field("region", FieldSpec::string().optional())
        .field("id", FieldSpec::string().computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(RuleHandler))
        .with_importer(ImportSpec::path(vec!["policy_id", "id"]))
}

pub struct RuleHandler;

impl RuleHandler {
    fn policy_id(ctx: &OperationContext) -> String {
        ctx.desired
            .attributes
            .get_str("policy_id")
            .unwrap_or_default()
            .to_string()
    }

    fn write_attrs(ctx: &mut OperationContext, rule: crate::api::RulePayload) {
        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", rule.name);
        if let Some(action) = rule.action {
            attrs.set("action", action);
        }
        if let Some(priority) = rule.priority {
            attrs.set("priority", priority);
        }
        if let Some(url) = rule.url {
            attrs.set("url", url);
        }
        attrs.set("id", rule.id);
    }
}

#[async_trait]
impl LifecycleHandler for RuleHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let request = json!({
            "name": attrs.get_str("name").unwrap_or_default(),
            "action": attrs.get_str("action").unwrap_or("block"),
            "priority": attrs.get_int("priority").unwrap_or(50),
            "url": attrs.get_str("url"),
        });

        let policy_id = Self::policy_id(ctx);
        let api = WafApi::new(ctx);
        let rule = api.create_rule(&policy_id, request).await?;
        tracing::info!(rule = %rule.name, id = %rule.id, "created waf rule");
        ctx.desired.set_id(rule.id);
        Ok(())
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let policy_id = Self::policy_id(ctx);
        let api = WafApi::new(ctx);
        let rule = api.get_rule(&policy_id, &ctx.desired.id.clone()).await?;
        Self::write_attrs(ctx, rule);
        Ok(())
    }

    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let change_set = ctx.change_set.clone().unwrap_or_default();
        let attrs = &ctx.desired.attributes;

        let mut patch = json!({});
        for field in ["name", "action", "priority", "url"] {
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

        let policy_id = Self::policy_id(ctx);
        let api = WafApi::new(ctx);
        api.update_rule(&policy_id, &ctx.desired.id.clone(), patch)
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let policy_id = Self::policy_id(ctx);
        let api = WafApi::new(ctx);
        api.delete_rule(&policy_id, &ctx.desired.id.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratoform_core::AttrValue;

    #[test]
    fn schema_is_well_formed() {
        schema().check(TYPE_NAME).unwrap();
    }

    #[test]
    fn action_validator_lists_choices() {
        let spec = schema();
        let validator = spec.get("action").unwrap().validator.as_ref().unwrap();
        let diags = validator("action", &AttrValue::String("nuke".to_string()));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].detail.contains("block, allow, log"));
    }

    #[test]
    fn priority_bounds() {
        let spec = schema();
        let validator = spec.get("priority").unwrap().validator.as_ref().unwrap();
        assert!(validator("priority", &AttrValue::Int(50)).is_empty());
        assert_eq!(validator("priority", &AttrValue::Int(101)).len(), 1);
    }
}
