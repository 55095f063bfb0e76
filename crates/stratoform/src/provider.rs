//! Provider assembly

use crate::config::ProviderConfig;
use std::sync::Arc;
use stratoform_client::{ClientFactory, Credentials, EndpointResolver, RetryPolicy};
use stratoform_engine::{Engine, OperationOutcome, OperationRequest, ProviderRegistry};

/// Build the full resource type registry.
///
/// Registration order is alphabetical by service; the registry validates
/// every schema and fails provider start on the first malformed one.
pub fn build_registry() -> Result<ProviderRegistry, stratoform_engine::EngineError> {
    let mut builder = ProviderRegistry::builder();
    builder = stratoform_backup::register(builder);
    builder = stratoform_identity::register(builder);
    builder = stratoform_network::register(builder);
    builder = stratoform_orchestration::register(builder);
    builder = stratoform_waf::register(builder);
    builder.build()
}

/// The provider: engine plus configuration.
pub struct Provider {
    config: ProviderConfig,
    engine: Engine,
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Result<Self, stratoform_engine::EngineError> {
        let registry = build_registry()?;
        tracing::info!(
            region = %config.region,
            types = registry.len(),
            "provider initialized"
        );
        Ok(Self {
            config,
            engine: Engine::new(Arc::new(registry)),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// A client factory scoped to one operation. Fresh per call: the
    /// memoization cache must not outlive the operation context.
    pub fn factory(&self) -> Arc<ClientFactory> {
        let mut resolver = EndpointResolver::new(self.config.domain.clone());
        for (service, url) in &self.config.endpoint_overrides {
            resolver.set_override(service.clone(), url.clone());
        }

        let mut credentials = Credentials::bearer(self.config.auth_token.clone());
        if let Some(project_id) = &self.config.project_id {
            credentials = credentials.with_project(project_id.clone());
        }

        Arc::new(
            ClientFactory::new(resolver, credentials, self.config.region.clone()).with_retry(
                RetryPolicy {
                    max_attempts: self.config.max_retries,
                    ..RetryPolicy::default()
                },
            ),
        )
    }

    /// Execute one operation end to end.
    pub async fn execute(&self, request: OperationRequest) -> OperationOutcome {
        self.engine.execute(self.factory(), request).await
    }

    /// Schema descriptions for every registered resource type.
    pub fn describe(&self) -> serde_json::Value {
        self.engine.registry().describe()
    }
}
