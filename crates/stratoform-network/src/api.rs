//! Direct-connect service API client

use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use stratoform_client::{with_retry, ApiClient, ApiError, RetryPolicy};
use stratoform_engine::OperationContext;

pub const SERVICE: &str = "dcaas";
pub const VERSION: &str = "v2";

pub const STATUS_PENDING_CREATE: &str = "PENDING_CREATE";
pub const STATUS_PENDING_UPDATE: &str = "PENDING_UPDATE";
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_PENDING_DELETE: &str = "PENDING_DELETE";
pub const STATUS_ERROR: &str = "ERROR";

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitPayload {
    pub id: String,
    pub name: String,
    pub status: String,
    pub bandwidth: i64,
    #[serde(default)]
    pub port_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CircuitEnvelope {
    circuit: CircuitPayload,
}

#[derive(Clone)]
pub struct DirectConnectApi {
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl DirectConnectApi {
    pub fn new(ctx: &OperationContext) -> Self {
        Self {
            client: ctx.client(SERVICE, VERSION),
            retry: ctx.retry().clone(),
        }
    }

    async fn call(
        &self,
        method: &'static str,
        path: String,
        body: Option<Json>,
    ) -> Result<Json, ApiError> {
        let client = Arc::clone(&self.client);
        with_retry(&self.retry, || {
            let client = Arc::clone(&client);
            let path = path.clone();
            let body = body.clone();
            async move {
                match method {
                    "GET" => client.get(&path).await,
                    "POST" => client.post(&path, &body.unwrap_or(Json::Null)).await,
                    "PUT" => client.put(&path, &body.unwrap_or(Json::Null)).await,
                    _ => client.delete(&path).await,
                }
            }
        })
        .await
    }

    pub async fn create_circuit(&self, circuit: Json) -> Result<CircuitPayload, ApiError> {
        let body = self
            .call(
                "POST",
                "/circuits".to_string(),
                Some(json!({ "circuit": circuit })),
            )
            .await?;
        decode::<CircuitEnvelope>(body).map(|e| e.circuit)
    }

    pub async fn get_circuit(&self, id: &str) -> Result<CircuitPayload, ApiError> {
        let body = self.call("GET", format!("/circuits/{}", id), None).await?;
        decode::<CircuitEnvelope>(body).map(|e| e.circuit)
    }

    pub async fn update_circuit(&self, id: &str, patch: Json) -> Result<CircuitPayload, ApiError> {
        let body = self
            .call(
                "PUT",
                format!("/circuits/{}", id),
                Some(json!({ "circuit": patch })),
            )
            .await?;
        decode::<CircuitEnvelope>(body).map(|e| e.circuit)
    }

    pub async fn delete_circuit(&self, id: &str) -> Result<(), ApiError> {
        self.call("DELETE", format!("/circuits/{}", id), None)
            .await
            .map(|_| ())
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Json) -> Result<T, ApiError> {
    serde_json::from_value(body.clone())
        .map_err(|_| ApiError::decode("direct-connect response", &body.to_string()))
}
