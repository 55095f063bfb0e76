//! Orchestration service API client

use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use stratoform_client::{with_retry, ApiClient, ApiError, RetryPolicy};
use stratoform_engine::OperationContext;

pub const SERVICE: &str = "rts";
pub const VERSION: &str = "v1";

pub const CREATE_IN_PROGRESS: &str = "CREATE_IN_PROGRESS";
pub const CREATE_COMPLETE: &str = "CREATE_COMPLETE";
pub const CREATE_FAILED: &str = "CREATE_FAILED";
pub const UPDATE_IN_PROGRESS: &str = "UPDATE_IN_PROGRESS";
pub const UPDATE_COMPLETE: &str = "UPDATE_COMPLETE";
pub const UPDATE_FAILED: &str = "UPDATE_FAILED";
pub const DELETE_IN_PROGRESS: &str = "DELETE_IN_PROGRESS";
pub const DELETE_COMPLETE: &str = "DELETE_COMPLETE";

#[derive(Debug, Clone, Deserialize)]
pub struct StackPayload {
    pub id: String,
    pub stack_name: String,
    pub stack_status: String,
    #[serde(default)]
    pub stack_status_reason: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Json>,
    #[serde(default)]
    pub outputs: Vec<OutputPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputPayload {
    pub output_key: String,
    pub output_value: Json,
}

#[derive(Debug, Deserialize)]
struct StackEnvelope {
    stack: StackPayload,
}

#[derive(Clone)]
pub struct StackApi {
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl StackApi {
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

    pub async fn create_stack(&self, stack: Json) -> Result<StackPayload, ApiError> {
        let body = self
            .call("POST", "/stacks".to_string(), Some(stack))
            .await?;
        decode::<StackEnvelope>(body).map(|e| e.stack)
    }

    pub async fn get_stack(&self, id: &str) -> Result<StackPayload, ApiError> {
        let body = self.call("GET", format!("/stacks/{}", id), None).await?;
        decode::<StackEnvelope>(body).map(|e| e.stack)
    }

    pub async fn update_stack(&self, id: &str, patch: Json) -> Result<(), ApiError> {
        self.call("PUT", format!("/stacks/{}", id), Some(patch))
            .await
            .map(|_| ())
    }

    pub async fn delete_stack(&self, id: &str) -> Result<(), ApiError> {
        self.call("DELETE", format!("/stacks/{}", id), None)
            .await
            .map(|_| ())
    }

    pub fn stack_request(
        name: &str,
        template: &str,
        parameters: Json,
        timeout_mins: i64,
        disable_rollback: bool,
    ) -> Json {
        // Templates arrive as text; the service accepts them verbatim
        json!({
            "stack_name": name,
            "template": template,
            "parameters": parameters,
            "timeout_mins": timeout_mins,
            "disable_rollback": disable_rollback,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Json) -> Result<T, ApiError> {
    serde_json::from_value(body.clone())
        .map_err(|_| ApiError::decode("orchestration response", &body.to_string()))
}
