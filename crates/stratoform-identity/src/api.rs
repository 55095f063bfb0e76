//! Identity service API client
//!
//! Typed wrapper over the `iam` service, v3. Every call retries under the
//! context's backoff policy before surfacing a classified error.

use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use stratoform_client::{with_retry, ApiClient, ApiError, RetryPolicy};
use stratoform_engine::OperationContext;

pub const SERVICE: &str = "iam";
pub const VERSION: &str = "v3";

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UsersEnvelope {
    users: Vec<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct GroupEnvelope {
    group: GroupPayload,
}

#[derive(Debug, Deserialize)]
struct MembersEnvelope {
    users: Vec<UserPayload>,
}

#[derive(Clone)]
pub struct IdentityApi {
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl IdentityApi {
    pub fn new(ctx: &OperationContext) -> Self {
        Self {
            client: ctx.client(SERVICE, VERSION),
            retry: ctx.retry().clone(),
        }
    }

    async fn get(&self, path: String) -> Result<Json, ApiError> {
        let client = Arc::clone(&self.client);
        with_retry(&self.retry, || {
            let client = Arc::clone(&client);
            let path = path.clone();
            async move { client.get(&path).await }
        })
        .await
    }

    async fn post(&self, path: String, body: Json) -> Result<Json, ApiError> {
        let client = Arc::clone(&self.client);
        with_retry(&self.retry, || {
            let client = Arc::clone(&client);
            let path = path.clone();
            let body = body.clone();
            async move { client.post(&path, &body).await }
        })
        .await
    }

    async fn patch(&self, path: String, body: Json) -> Result<Json, ApiError> {
        let client = Arc::clone(&self.client);
        with_retry(&self.retry, || {
            let client = Arc::clone(&client);
            let path = path.clone();
            let body = body.clone();
            async move { client.patch(&path, &body).await }
        })
        .await
    }

    async fn put(&self, path: String, body: Json) -> Result<Json, ApiError> {
        let client = Arc::clone(&self.client);
        with_retry(&self.retry, || {
            let client = Arc::clone(&client);
            let path = path.clone();
            let body = body.clone();
            async move { client.put(&path, &body).await }
        })
        .await
    }

    async fn delete(&self, path: String) -> Result<Json, ApiError> {
        let client = Arc::clone(&self.client);
        with_retry(&self.retry, || {
            let client = Arc::clone(&client);
            let path = path.clone();
            async move { client.delete(&path).await }
        })
        .await
    }

    // ── Users ───────────────────────────────────────────────────

    pub async fn create_user(&self, user: Json) -> Result<UserPayload, ApiError> {
        let body = self.post("/users".to_string(), json!({ "user": user })).await?;
        decode::<UserEnvelope>(body).map(|e| e.user)
    }

    pub async fn get_user(&self, id: &str) -> Result<UserPayload, ApiError> {
        let body = self.get(format!("/users/{}", id)).await?;
        decode::<UserEnvelope>(body).map(|e| e.user)
    }

    pub async fn update_user(&self, id: &str, patch: Json) -> Result<UserPayload, ApiError> {
        let body = self
            .patch(format!("/users/{}", id), json!({ "user": patch }))
            .await?;
        decode::<UserEnvelope>(body).map(|e| e.user)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        self.delete(format!("/users/{}", id)).await.map(|_| ())
    }

    /// Lookup by the unique name; used by import when the given string is
    /// not a valid id.
    pub async fn find_user_by_name(&self, name: &str) -> Result<Option<UserPayload>, ApiError> {
        let body = self.get(format!("/users?name={}", name)).await?;
        decode::<UsersEnvelope>(body).map(|e| e.users.into_iter().next())
    }

    // ── Groups ──────────────────────────────────────────────────

    pub async fn create_group(&self, group: Json) -> Result<GroupPayload, ApiError> {
        let body = self
            .post("/groups".to_string(), json!({ "group": group }))
            .await?;
        decode::<GroupEnvelope>(body).map(|e| e.group)
    }

    pub async fn get_group(&self, id: &str) -> Result<GroupPayload, ApiError> {
        let body = self.get(format!("/groups/{}", id)).await?;
        decode::<GroupEnvelope>(body).map(|e| e.group)
    }

    pub async fn update_group(&self, id: &str, patch: Json) -> Result<GroupPayload, ApiError> {
        let body = self
            .patch(format!("/groups/{}", id), json!({ "group": patch }))
            .await?;
        decode::<GroupEnvelope>(body).map(|e| e.group)
    }

    pub async fn delete_group(&self, id: &str) -> Result<(), ApiError> {
        self.delete(format!("/groups/{}", id)).await.map(|_| ())
    }

    // ── Group membership ────────────────────────────────────────

    pub async fn list_members(&self, group_id: &str) -> Result<Vec<String>, ApiError> {
        let body = self.get(format!("/groups/{}/users", group_id)).await?;
        decode::<MembersEnvelope>(body).map(|e| e.users.into_iter().map(|u| u.id).collect())
    }

    /// Idempotent: adding an existing member is a no-op success remotely.
    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.put(format!("/groups/{}/users/{}", group_id, user_id), Json::Null)
            .await
            .map(|_| ())
    }

    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<(), ApiError> {
        match self
            .delete(format!("/groups/{}/users/{}", group_id, user_id))
            .await
        {
            Ok(_) => Ok(()),
            // Removing an already-absent member is a satisfied unbind
            Err(err) if err.is_gone() => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Json) -> Result<T, ApiError> {
    serde_json::from_value(body.clone())
        .map_err(|_| ApiError::decode("identity response", &body.to_string()))
}
