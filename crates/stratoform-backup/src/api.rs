//! Backup service API client
//!
//! The `cbr` service exposes vaults and policies on v3. Vault status moves
//! through `creating → available → deleting` with `error` terminal; tags
//! live on a separate batch path.

use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use stratoform_client::{with_retry, ApiClient, ApiError, RetryPolicy};
use stratoform_engine::OperationContext;

pub const SERVICE: &str = "cbr";
pub const VERSION: &str = "v3";

pub const STATUS_CREATING: &str = "creating";
pub const STATUS_AVAILABLE: &str = "available";
pub const STATUS_DELETING: &str = "deleting";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, Deserialize)]
pub struct VaultPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagPayload {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyPayload {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub backup_cycle: Option<i64>,
    #[serde(default)]
    pub retention_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct VaultEnvelope {
    vault: VaultPayload,
}

#[derive(Debug, Deserialize)]
struct PolicyEnvelope {
    policy: PolicyPayload,
}

#[derive(Clone)]
pub struct BackupApi {
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl BackupApi {
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

    // ── Vaults ──────────────────────────────────────────────────

    pub async fn create_vault(&self, vault: Json) -> Result<VaultPayload, ApiError> {
        let body = self
            .call("POST", "/vaults".to_string(), Some(json!({ "vault": vault })))
            .await?;
        decode::<VaultEnvelope>(body).map(|e| e.vault)
    }

    pub async fn get_vault(&self, id: &str) -> Result<VaultPayload, ApiError> {
        let body = self.call("GET", format!("/vaults/{}", id), None).await?;
        decode::<VaultEnvelope>(body).map(|e| e.vault)
    }

    pub async fn update_vault(&self, id: &str, patch: Json) -> Result<VaultPayload, ApiError> {
        let body = self
            .call("PUT", format!("/vaults/{}", id), Some(json!({ "vault": patch })))
            .await?;
        decode::<VaultEnvelope>(body).map(|e| e.vault)
    }

    /// `keep_policy` is forwarded verbatim; its remote effect is owned by
    /// the service.
    pub async fn delete_vault(&self, id: &str, keep_policy: bool) -> Result<(), ApiError> {
        self.call(
            "DELETE",
            format!("/vaults/{}?keep_policy={}", id, keep_policy),
            None,
        )
        .await
        .map(|_| ())
    }

    // ── Vault tags (separate batch path) ────────────────────────

    pub async fn add_tags(&self, vault_id: &str, tags: &[(String, String)]) -> Result<(), ApiError> {
        let body = json!({
            "tags": tags
                .iter()
                .map(|(k, v)| json!({"key": k, "value": v}))
                .collect::<Vec<_>>(),
        });
        self.call("POST", format!("/vaults/{}/tags/create", vault_id), Some(body))
            .await
            .map(|_| ())
    }

    pub async fn remove_tags(
        &self,
        vault_id: &str,
        tags: &[(String, String)],
    ) -> Result<(), ApiError> {
        let body = json!({
            "tags": tags
                .iter()
                .map(|(k, v)| json!({"key": k, "value": v}))
                .collect::<Vec<_>>(),
        });
        self.call("POST", format!("/vaults/{}/tags/delete", vault_id), Some(body))
            .await
            .map(|_| ())
    }

    // ── Policies ────────────────────────────────────────────────

    pub async fn create_policy(&self, policy: Json) -> Result<PolicyPayload, ApiError> {
        let body = self
            .call(
                "POST",
                "/policies".to_string(),
                Some(json!({ "policy": policy })),
            )
            .await?;
        decode::<PolicyEnvelope>(body).map(|e| e.policy)
    }

    pub async fn get_policy(&self, id: &str) -> Result<PolicyPayload, ApiError> {
        let body = self.call("GET", format!("/policies/{}", id), None).await?;
        decode::<PolicyEnvelope>(body).map(|e| e.policy)
    }

    pub async fn update_policy(&self, id: &str, patch: Json) -> Result<PolicyPayload, ApiError> {
        let body = self
            .call(
                "PUT",
                format!("/policies/{}", id),
                Some(json!({ "policy": patch })),
            )
            .await?;
        decode::<PolicyEnvelope>(body).map(|e| e.policy)
    }

    pub async fn delete_policy(&self, id: &str) -> Result<(), ApiError> {
        self.call("DELETE", format!("/policies/{}", id), None)
            .await
            .map(|_| ())
    }

    // ── Policy binding ──────────────────────────────────────────

    /// Idempotent: binding an already-bound policy is a no-op success.
    pub async fn bind_policy(&self, vault_id: &str, policy_id: &str) -> Result<(), ApiError> {
        self.call(
            "POST",
            format!("/vaults/{}/associatepolicy", vault_id),
            Some(json!({ "policy_id": policy_id })),
        )
        .await
        .map(|_| ())
    }

    /// Idempotent: unbinding an unbound policy is a no-op success.
    pub async fn unbind_policy(&self, vault_id: &str, policy_id: &str) -> Result<(), ApiError> {
        match self
            .call(
                "POST",
                format!("/vaults/{}/dissociatepolicy", vault_id),
                Some(json!({ "policy_id": policy_id })),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_gone() => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Json) -> Result<T, ApiError> {
    serde_json::from_value(body.clone())
        .map_err(|_| ApiError::decode("backup response", &body.to_string()))
}
