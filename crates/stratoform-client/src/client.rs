//! HTTP facade for one service endpoint
//!
//! Thin JSON-in/JSON-out wrapper over `reqwest` with the error envelope
//! decoded into [`ApiError`]. One `ApiClient` is bound to a single
//! `(service, version, region)` triple and reused across sequential calls
//! within an operation.

use crate::classify::{decode_success, error_from_body};
use crate::error::ApiError;
use reqwest::Method;
use serde_json::Value as Json;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    service: String,
    token: String,
    project_id: Option<String>,
}

impl ApiClient {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: String,
        service: String,
        token: String,
        project_id: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            service,
            token,
            project_id,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<Json, ApiError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Json) -> Result<Json, ApiError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Json) -> Result<Json, ApiError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Json) -> Result<Json, ApiError> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Json, ApiError> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Json>,
    ) -> Result<Json, ApiError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        tracing::debug!(service = %self.service, %method, %url, "remote call");

        let mut request = self
            .http
            .request(method, url.as_str())
            .bearer_auth(&self.token)
            .header("Accept", "application/json");
        if let Some(project) = &self.project_id {
            request = request.header("X-Project-Id", project);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiError::transport(&e))?;

        let status = response.status().as_u16();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport(&e))?;

        if (200..300).contains(&status) {
            decode_success(&text)
        } else {
            let err = error_from_body(status, &text, request_id);
            tracing::debug!(
                service = %self.service,
                status,
                kind = %err.kind,
                "remote call failed"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratoform_core::ErrorKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(
            reqwest::Client::new(),
            format!("{}/v3", server.uri()),
            "test".to_string(),
            "tok-1".to_string(),
            Some("proj-1".to_string()),
        )
    }

    #[tokio::test]
    async fn get_decodes_json_and_sends_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/things/1"))
            .and(header("Authorization", "Bearer tok-1"))
            .and(header("X-Project-Id", "proj-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let body = client.get("/things/1").await.unwrap();
        assert_eq!(body["id"], "1");
    }

    #[tokio::test]
    async fn error_envelope_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/things/404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": "Thing.NotFound", "message": "no such thing", "request_id": "req-7"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get("/things/404").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Gone);
        assert_eq!(err.request_id.as_deref(), Some("req-7"));
    }

    #[tokio::test]
    async fn empty_delete_body_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v3/things/1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let body = client.delete("/things/1").await.unwrap();
        assert!(body.is_null());
    }
}
