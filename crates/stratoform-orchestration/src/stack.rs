//! Orchestration stack resource

use crate::api::{
    StackApi, CREATE_COMPLETE, CREATE_IN_PROGRESS, DELETE_COMPLETE, DELETE_IN_PROGRESS,
    UPDATE_COMPLETE, UPDATE_IN_PROGRESS,
};
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stratoform_client::ApiError;
use stratoform_core::{AttrValue, FieldKind, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, Observation, OperationContext, ResourceTypeDescriptor,
    StateWaiter,
};

pub const TYPE_NAME: &str = "stratus_orchestration_stack";

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Template equality is semantic: two JSON texts that parse to the same
/// document are the same template.
fn template_equal(old: &AttrValue, new: &AttrValue) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(a), Some(b)) => {
            match (
                serde_json::from_str::<Json>(a),
                serde_json::from_str::<Json>(b),
            ) {
                (Ok(a), Ok(b)) => a == b,
                _ => a == b,
            }
        }
        _ => old == new,
    }
}

pub fn schema() -> Schema {
    Schema::new()
        .field("name", FieldSpec::string().required().force_new())
        .field(
            "template",
            FieldSpec::string().required().suppress_diff(template_equal),
        )
        .field("parameters", FieldSpec::map(FieldKind::String).optional())
        .field("timeout_mins", FieldSpec::int().optional().default_value(60))
        .field(
            "disable_rollback",
            FieldSpec::bool().optional().default_value(true),
        )
        .field("region", FieldSpec::string().optional().force_new())
        .field("id", FieldSpec::string().computed())
        .field("status", FieldSpec::string().computed())
        .field("outputs", FieldSpec::map(FieldKind::String).computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(StackHandler))
        .with_importer(ImportSpec::path(vec!["name", "id"]))
}

pub struct StackHandler;

impl StackHandler {
    fn parameters(ctx: &OperationContext) -> Json {
        match ctx.desired.attributes.get_present("parameters") {
            Some(value) => value.to_json(),
            None => json!({}),
        }
    }

    fn write_attrs(ctx: &mut OperationContext, stack: crate::api::StackPayload) {
        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", stack.stack_name);
        attrs.set("status", stack.stack_status);
        let mut outputs = BTreeMap::new();
        for output in stack.outputs {
            let rendered = match output.output_value {
                Json::String(s) => s,
                other => other.to_string(),
            };
            outputs.insert(output.output_key, AttrValue::String(rendered));
        }
        attrs.set("outputs", AttrValue::Map(outputs));
        attrs.set("id", stack.id);
    }

    /// Poll the stack's own state machine. `*_FAILED` and `ROLLBACK_*`
    /// are not listed as pending, so they surface as unexpected states
    /// with the remote reason attached.
    async fn wait_for(
        ctx: &OperationContext,
        id: &str,
        pending: &[&str],
        target: &str,
        what: &str,
    ) -> Result<(), ApiError> {
        let api = StackApi::new(ctx);
        let waiter = StateWaiter::new(pending.to_vec(), vec![target])
            .timeout(ctx.wait_budget(Duration::from_secs(3600)))
            .min_interval(POLL_INTERVAL);

        waiter
            .wait(ctx.cancel_token(), || {
                let api = api.clone();
                let id = id.to_string();
                async move {
                    let stack = api.get_stack(&id).await?;
                    Ok(Observation::new(
                        stack.stack_status.clone(),
                        json!({"status_reason": stack.stack_status_reason}),
                    ))
                }
            })
            .await
            .into_api_result(what)
            .map(|_| ())
    }
}

#[async_trait]
impl LifecycleHandler for StackHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let request = StackApi::stack_request(
            attrs.get_str("name").unwrap_or_default(),
            attrs.get_str("template").unwrap_or_default(),
            Self::parameters(ctx),
            attrs.get_int("timeout_mins").unwrap_or(60),
            attrs.get_bool("disable_rollback").unwrap_or(true),
        );

        let api = StackApi::new(ctx);
        let stack = api.create_stack(request).await?;
        tracing::info!(stack = %stack.stack_name, id = %stack.id, "created stack");
        ctx.desired.set_id(stack.id.clone());

        Self::wait_for(
            ctx,
            &stack.id,
            &[CREATE_IN_PROGRESS],
            CREATE_COMPLETE,
            "stack creation",
        )
        .await
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = StackApi::new(ctx);
        let stack = api.get_stack(&ctx.desired.id.clone()).await?;
        Self::write_attrs(ctx, stack);
        Ok(())
    }

    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let patch = json!({
            "template": attrs.get_str("template").unwrap_or_default(),
            "parameters": Self::parameters(ctx),
            "timeout_mins": attrs.get_int("timeout_mins").unwrap_or(60),
            "disable_rollback": attrs.get_bool("disable_rollback").unwrap_or(true),
        });

        let id = ctx.desired.id.clone();
        let api = StackApi::new(ctx);
        api.update_stack(&id, patch).await?;
        ctx.check_cancelled()?;

        Self::wait_for(
            ctx,
            &id,
            &[UPDATE_IN_PROGRESS],
            UPDATE_COMPLETE,
            "stack update",
        )
        .await
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let id = ctx.desired.id.clone();
        let api = StackApi::new(ctx);
        api.delete_stack(&id).await?;

        let waiter = StateWaiter::new(
            vec![DELETE_IN_PROGRESS, CREATE_COMPLETE, UPDATE_COMPLETE],
            vec![Observation::DELETED],
        )
        .timeout(ctx.wait_budget(Duration::from_secs(1800)))
        .min_interval(POLL_INTERVAL);

        waiter
            .wait(ctx.cancel_token(), || {
                let api = api.clone();
                let id = id.clone();
                async move {
                    match api.get_stack(&id).await {
                        // DELETE_COMPLETE and a 404 both mean the stack is
                        // gone
                        Ok(stack) if stack.stack_status == DELETE_COMPLETE => {
                            Ok(Observation::deleted())
                        }
                        Ok(stack) => Ok(Observation::new(
                            stack.stack_status.clone(),
                            json!({"status_reason": stack.stack_status_reason}),
                        )),
                        Err(err) if err.is_gone() => Ok(Observation::deleted()),
                        Err(err) => Err(err),
                    }
                }
            })
            .await
            .into_api_result("stack deletion")
            .map(|_| ())
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
    fn name_forces_replacement() {
        assert!(schema().get("name").unwrap().force_new);
    }

    #[test]
    fn template_diff_is_semantic() {
        let a = AttrValue::String(r#"{"resources": {"a": 1}}"#.to_string());
        let b = AttrValue::String("{\n  \"resources\": {\"a\": 1}\n}".to_string());
        assert!(template_equal(&a, &b));

        let c = AttrValue::String(r#"{"resources": {"a": 2}}"#.to_string());
        assert!(!template_equal(&a, &c));
    }

    #[test]
    fn non_json_templates_compare_verbatim() {
        let a = AttrValue::String("resources: {}".to_string());
        let b = AttrValue::String("resources: {}".to_string());
        assert!(template_equal(&a, &b));
    }
}
