//! Memoized per-context client construction
//!
//! One factory lives for the duration of one operation; its cache is keyed
//! by `(service, version, region)` so a handler touching two service
//! versions (a v3 create plus a v3.0 status probe) authenticates once per
//! endpoint. Factories are never shared across operations.

use crate::client::ApiClient;
use crate::credentials::Credentials;
use crate::endpoint::EndpointResolver;
use crate::retry::RetryPolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Cache key for one constructed client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub service: String,
    pub version: String,
    pub region: String,
}

pub struct ClientFactory {
    resolver: EndpointResolver,
    credentials: Credentials,
    default_region: String,
    retry: RetryPolicy,
    http: reqwest::Client,
    cache: Mutex<HashMap<ClientKey, Arc<ApiClient>>>,
}

impl ClientFactory {
    pub fn new(
        resolver: EndpointResolver,
        credentials: Credentials,
        default_region: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            credentials,
            default_region: default_region.into(),
            retry: RetryPolicy::default(),
            http: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// The backoff policy remote calls in this context should use.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Get or build the client for `(service, version, region)`.
    ///
    /// `region` of `None` falls back to the provider-wide default.
    pub fn client(
        &self,
        service: &str,
        version: &str,
        region: Option<&str>,
    ) -> Arc<ApiClient> {
        let region = region.unwrap_or(&self.default_region);
        let key = ClientKey {
            service: service.to_string(),
            version: version.to_string(),
            region: region.to_string(),
        };

        let mut cache = self.cache.lock().expect("client cache poisoned");
        if let Some(client) = cache.get(&key) {
            tracing::debug!(service, version, region, "client cache hit");
            return Arc::clone(client);
        }

        let endpoint = self.resolver.resolve(service, region);
        let base_url = format!("{}/{}", endpoint, version.trim_start_matches('/'));
        tracing::debug!(service, version, region, %base_url, "building service client");

        let client = Arc::new(ApiClient::new(
            self.http.clone(),
            base_url,
            service.to_string(),
            self.credentials.token.clone(),
            self.credentials.project_id.clone(),
        ));
        cache.insert(key, Arc::clone(&client));
        client
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("default_region", &self.default_region)
            .field("credentials", &self.credentials)
            .finish()
    }
}
