//! WAF protected domain resource

use crate::api::WafApi;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use stratoform_client::ApiError;
use stratoform_core::{Diagnostic, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, OperationContext, ResourceTypeDescriptor,
};

pub const TYPE_NAME: &str = "stratus_waf_domain";

pub fn schema() -> Schema {
    Schema::new()
        .field(
            "hostname",
            FieldSpec::string()
                .required()
                .force_new()
                .validate_with(|path, value| match value.as_str() {
                    Some(s) if s.contains('/') || s.is_empty() => {
                        vec![Diagnostic::error("Hostname must be a bare domain name")
                            .with_field(path.to_string())]
                    }
                    _ => vec![],
                }),
        )
        .field("policy_id", FieldSpec::string().required())
        .field("proxy", FieldSpec::bool().optional().default_value(false))
        .field("region", FieldSpec::string().optional())
        .field("id", FieldSpec::string().computed())
        .field("protect_status", FieldSpec::int().computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(DomainHandler))
        .with_importer(ImportSpec::simple())
}

pub struct DomainHandler;

impl DomainHandler {
    fn write_attrs(ctx: &mut OperationContext, domain: crate::api::DomainPayload) {
        let attrs = &mut ctx.desired.attributes;
        attrs.set("hostname", domain.hostname);
        attrs.set("policy_id", domain.policy_id);
        attrs.set("proxy", domain.proxy);
        if let Some(status) = domain.protect_status {
            attrs.set("protect_status", status);
        }
        attrs.set("id", domain.id);
    }
}

#[async_trait]
impl LifecycleHandler for DomainHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let request = WafApi::domain_request(
            attrs.get_str("hostname").unwrap_or_default(),
            attrs.get_str("policy_id").unwrap_or_default(),
            attrs.get_bool("proxy").unwrap_or(false),
        );

        let api = WafApi::new(ctx);
        let domain = api.create_domain(request).await?;
        tracing::info!(hostname = %domain.hostname, id = %domain.id, "created waf domain");
        ctx.desired.set_id(domain.id);
        Ok(())
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = WafApi::new(ctx);
        let domain = api.get_domain(&ctx.desired.id.clone()).await?;
        Self::write_attrs(ctx, domain);
        Ok(())
    }

    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let change_set = ctx.change_set.clone().unwrap_or_default();
        let attrs = &ctx.desired.attributes;

        let mut patch = json!({});
        if change_set.touches("policy_id") {
            patch["policy_id"] = json!(attrs.get_str("policy_id").unwrap_or_default());
        }
        if change_set.touches("proxy") {
            patch["proxy"] = json!(attrs.get_bool("proxy").unwrap_or(false));
        }
        if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        let api = WafApi::new(ctx);
        api.update_domain(&ctx.desired.id.clone(), patch).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = WafApi::new(ctx);
        api.delete_domain(&ctx.desired.id.clone()).await
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
    fn hostname_forces_replacement() {
        assert!(schema().get("hostname").unwrap().force_new);
    }

    #[test]
    fn hostname_validator_rejects_paths() {
        let spec = schema();
        let validator = spec.get("hostname").unwrap().validator.as_ref().unwrap();
        assert_eq!(
            validator(
                "hostname",
                &AttrValue::String("app.example.com/admin".to_string())
            )
            .len(),
            1
        );
        assert!(validator("hostname", &AttrValue::String("app.example.com".to_string())).is_empty());
    }
}
