//! Identity user resource
//!
//! Simple CRUD with synchronous provisioning. Import accepts either the
//! remote id or, when the remote rejects the string as an id, the unique
//! user name.

use crate::api::IdentityApi;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use stratoform_client::ApiError;
use stratoform_core::{Diagnostic, ErrorKind, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, OperationContext, ResourceTypeDescriptor,
};

pub const TYPE_NAME: &str = "stratus_identity_user";

pub fn schema() -> Schema {
    Schema::new()
        .field(
            "name",
            FieldSpec::string()
                .required()
                .validate_with(|path, value| match value.as_str() {
                    Some(s) if s.is_empty() || s.len() > 64 => {
                        vec![Diagnostic::error("User name must be 1..=64 characters")
                            .with_field(path.to_string())]
                    }
                    _ => vec![],
                }),
        )
        .field("description", FieldSpec::string().optional())
        .field("enabled", FieldSpec::bool().optional().default_value(true))
        .field("password", FieldSpec::string().optional().sensitive())
        .field("region", FieldSpec::string().optional())
        .field("id", FieldSpec::string().computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(UserHandler))
        .with_importer(ImportSpec::simple())
}

pub struct UserHandler;

impl UserHandler {
    fn request_body(ctx: &OperationContext) -> serde_json::Value {
        let attrs = &ctx.desired.attributes;
        let mut body = json!({
            "name": attrs.get_str("name").unwrap_or_default(),
            "enabled": attrs.get_bool("enabled").unwrap_or(true),
        });
        if let Some(description) = attrs.get_str("description") {
            body["description"] = json!(description);
        }
        if let Some(password) = attrs.get_str("password") {
            body["password"] = json!(password);
        }
        body
    }
}

#[async_trait]
impl LifecycleHandler for UserHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = IdentityApi::new(ctx);
        let user = api.create_user(Self::request_body(ctx)).await?;
        tracing::info!(user = %user.name, id = %user.id, "created identity user");
        ctx.desired.set_id(user.id);
        Ok(())
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = IdentityApi::new(ctx);
        let user = api.get_user(&ctx.desired.id.clone()).await?;

        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", user.name);
        if let Some(description) = user.description {
            attrs.set("description", description);
        }
        attrs.set("enabled", user.enabled);
        attrs.set("id", user.id);
        // `password` is write-only; the remote never returns it
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
        if change_set.touches("enabled") {
            patch["enabled"] = json!(attrs.get_bool("enabled").unwrap_or(true));
        }
        if change_set.touches("password") {
            patch["password"] = json!(attrs.get_str("password").unwrap_or_default());
        }
        if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        let api = IdentityApi::new(ctx);
        api.update_user(&ctx.desired.id.clone(), patch).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = IdentityApi::new(ctx);
        api.delete_user(&ctx.desired.id.clone()).await
    }

    async fn import(&self, ctx: &mut OperationContext, given: &str) -> Result<(), ApiError> {
        let api = IdentityApi::new(ctx);
        match api.get_user(given).await {
            Ok(_) => Ok(()),
            // Not a valid id: fall back to the unique-name lookup and
            // rewrite the id before the engine reads
            Err(err) if matches!(err.kind, ErrorKind::InvalidInput | ErrorKind::Gone) => {
                match api.find_user_by_name(given).await? {
                    Some(user) => {
                        tracing::debug!(name = given, id = %user.id, "import resolved by name");
                        ctx.desired.set_id(user.id);
                        Ok(())
                    }
                    None => Err(ApiError::new(
                        ErrorKind::Gone,
                        format!("no user with id or name `{}`", given),
                    )),
                }
            }
            Err(err) => Err(err),
        }
    }
}
