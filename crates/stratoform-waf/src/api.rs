//! WAF service API client

use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use stratoform_client::{with_retry, ApiClient, ApiError, RetryPolicy};
use stratoform_engine::OperationContext;

pub const SERVICE: &str = "waf";
pub const VERSION: &str = "v1";

#[derive(Debug, Clone, Deserialize)]
pub struct DomainPayload {
    pub id: String,
    pub hostname: String,
    pub policy_id: String,
    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub protect_status: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulePayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct WafApi {
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl WafApi {
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
                    "PATCH" => client.patch(&path, &body.unwrap_or(Json::Null)).await,
                    _ => client.delete(&path).await,
                }
            }
        })
        .await
    }

    // ── Domains ─────────────────────────────────────────────────

    pub async fn create_domain(&self, domain: Json) -> Result<DomainPayload, ApiError> {
        let body = self.call("POST", "/domains".to_string(), Some(domain)).await?;
        decode(body)
    }

    pub async fn get_domain(&self, id: &str) -> Result<DomainPayload, ApiError> {
        let body = self.call("GET", format!("/domains/{}", id), None).await?;
        decode(body)
    }

    pub async fn update_domain(&self, id: &str, patch: Json) -> Result<DomainPayload, ApiError> {
        let body = self
            .call("PATCH", format!("/domains/{}", id), Some(patch))
            .await?;
        decode(body)
    }

    pub async fn delete_domain(&self, id: &str) -> Result<(), ApiError> {
        self.call("DELETE", format!("/domains/{}", id), None)
            .await
            .map(|_| ())
    }

    // ── Rules ───────────────────────────────────────────────────

    pub async fn create_rule(&self, policy_id: &str, rule: Json) -> Result<RulePayload, ApiError> {
        let body = self
            .call(
                "POST",
                format!("/policies/{}/rules", policy_id),
                Some(rule),
            )
            .await?;
        decode(body)
    }

    pub async fn get_rule(&self, policy_id: &str, id: &str) -> Result<RulePayload, ApiError> {
        let body = self
            .call("GET", format!("/policies/{}/rules/{}", policy_id, id), None)
            .await?;
        decode(body)
    }

    pub async fn update_rule(
        &self,
        policy_id: &str,
        id: &str,
        patch: Json,
    ) -> Result<RulePayload, ApiError> {
        let body = self
            .call(
                "PATCH",
                format!("/policies/{}/rules/{}", policy_id, id),
                Some(patch),
            )
            .await?;
        decode(body)
    }

    pub async fn delete_rule(&self, policy_id: &str, id: &str) -> Result<(), ApiError> {
        self.call(
            "DELETE",
            format!("/policies/{}/rules/{}", policy_id, id),
            None,
        )
        .await
        .map(|_| ())
    }

    pub fn domain_request(hostname: &str, policy_id: &str, proxy: bool) -> Json {
        json!({
            "hostname": hostname,
            "policy_id": policy_id,
            "proxy": proxy,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Json) -> Result<T, ApiError> {
    serde_json::from_value(body.clone())
        .map_err(|_| ApiError::decode("waf response", &body.to_string()))
}
