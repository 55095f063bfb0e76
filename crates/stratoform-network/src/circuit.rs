//! Direct-connect circuit resource

use crate::api::{
    DirectConnectApi, STATUS_ACTIVE, STATUS_ERROR, STATUS_PENDING_CREATE, STATUS_PENDING_DELETE,
    STATUS_PENDING_UPDATE,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stratoform_client::ApiError;
use stratoform_core::{Diagnostic, FieldSpec, Schema};
use stratoform_engine::{
    ImportSpec, LifecycleHandler, Observation, OperationContext, ResourceTypeDescriptor,
    StateWaiter,
};

pub const TYPE_NAME: &str = "stratus_dc_circuit";

const POLL_INTERVAL: Duration = Duration::from_secs(15);

pub fn schema() -> Schema {
    Schema::new()
        .field("name", FieldSpec::string().required())
        .field(
            "bandwidth",
            FieldSpec::int()
                .required()
                .validate_with(|path, value| match value.as_int() {
                    Some(mbps) if !(2..=100_000).contains(&mbps) => {
                        vec![Diagnostic::error("Bandwidth must be 2..=100000 Mbit/s")
                            .with_field(path.to_string())]
                    }
                    _ => vec![],
                }),
        )
        .field("port_id", FieldSpec::string().required().force_new())
        .field("location", FieldSpec::string().optional().force_new())
        .field("region", FieldSpec::string().optional().force_new())
        .field("id", FieldSpec::string().computed())
        .field("status", FieldSpec::string().computed())
}

pub fn descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor::new(TYPE_NAME, schema(), Arc::new(CircuitHandler))
        .with_importer(ImportSpec::simple())
}

pub struct CircuitHandler;

impl CircuitHandler {
    fn write_attrs(ctx: &mut OperationContext, circuit: crate::api::CircuitPayload) {
        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", circuit.name);
        attrs.set("bandwidth", circuit.bandwidth);
        if let Some(port_id) = circuit.port_id {
            attrs.set("port_id", port_id);
        }
        if let Some(location) = circuit.location {
            attrs.set("location", location);
        }
        attrs.set("status", circuit.status);
        attrs.set("id", circuit.id);
    }

    async fn wait_active(ctx: &OperationContext, id: &str, what: &str) -> Result<(), ApiError> {
        let api = DirectConnectApi::new(ctx);
        let waiter = StateWaiter::new(
            vec![STATUS_PENDING_CREATE, STATUS_PENDING_UPDATE],
            vec![STATUS_ACTIVE],
        )
        .timeout(ctx.wait_budget(Duration::from_secs(900)))
        .min_interval(POLL_INTERVAL);

        waiter
            .wait(ctx.cancel_token(), || {
                let api = api.clone();
                let id = id.to_string();
                async move {
                    let circuit = api.get_circuit(&id).await?;
                    if circuit.status == STATUS_ERROR {
                        return Ok(Observation::new(
                            STATUS_ERROR,
                            json!({"status_reason": circuit.status_reason}),
                        ));
                    }
                    Ok(Observation::new(circuit.status.clone(), json!({})))
                }
            })
            .await
            .into_api_result(what)
            .map(|_| ())
    }
}

#[async_trait]
impl LifecycleHandler for CircuitHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let attrs = &ctx.desired.attributes;
        let mut body = json!({
            "name": attrs.get_str("name").unwrap_or_default(),
            "bandwidth": attrs.get_int("bandwidth").unwrap_or(0),
            "port_id": attrs.get_str("port_id").unwrap_or_default(),
        });
        if let Some(location) = attrs.get_str("location") {
            body["location"] = json!(location);
        }

        let api = DirectConnectApi::new(ctx);
        let circuit = api.create_circuit(body).await?;
        tracing::info!(circuit = %circuit.name, id = %circuit.id, "created circuit");
        ctx.desired.set_id(circuit.id.clone());

        Self::wait_active(ctx, &circuit.id, "circuit to become active").await
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let api = DirectConnectApi::new(ctx);
        let circuit = api.get_circuit(&ctx.desired.id.clone()).await?;
        Self::write_attrs(ctx, circuit);
        Ok(())
    }

    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let change_set = ctx.change_set.clone().unwrap_or_default();
        let attrs = &ctx.desired.attributes;

        let mut patch = json!({});
        if change_set.touches("name") {
            patch["name"] = json!(attrs.get_str("name").unwrap_or_default());
        }
        if change_set.touches("bandwidth") {
            patch["bandwidth"] = json!(attrs.get_int("bandwidth").unwrap_or(0));
        }
        if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        let id = ctx.desired.id.clone();
        let api = DirectConnectApi::new(ctx);
        api.update_circuit(&id, patch).await?;
        ctx.check_cancelled()?;
        Self::wait_active(ctx, &id, "circuit update").await
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let id = ctx.desired.id.clone();
        let api = DirectConnectApi::new(ctx);
        api.delete_circuit(&id).await?;

        let waiter = StateWaiter::new(
            vec![STATUS_PENDING_DELETE, STATUS_ACTIVE],
            vec![Observation::DELETED],
        )
        .timeout(ctx.wait_budget(Duration::from_secs(900)))
        .min_interval(POLL_INTERVAL);

        waiter
            .wait(ctx.cancel_token(), || {
                let api = api.clone();
                let id = id.clone();
                async move {
                    match api.get_circuit(&id).await {
                        Ok(circuit) => Ok(Observation::new(circuit.status, json!({}))),
                        Err(err) if err.is_gone() => Ok(Observation::deleted()),
                        Err(err) => Err(err),
                    }
                }
            })
            .await
            .into_api_result("circuit deletion")
            .map(|_| ())
    }
}
