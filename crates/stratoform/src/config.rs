//! Provider configuration

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Provider-wide settings the host supplies once per session.
///
/// `endpoint_overrides` pins a service to a fixed base URL; used for
/// private endpoints and by the test suites to point at a mock server.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub region: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    pub auth_token: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub endpoint_overrides: HashMap<String, String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_domain() -> String {
    "stratus.cloud".to_string()
}

fn default_max_retries() -> u32 {
    3
}

impl ProviderConfig {
    /// Build from environment variables. `STRATO_ENDPOINT_<SERVICE>`
    /// entries become endpoint overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let region = std::env::var("STRATO_REGION")
            .map_err(|_| ConfigError::MissingSetting("STRATO_REGION"))?;
        let auth_token = std::env::var("STRATO_TOKEN")
            .map_err(|_| ConfigError::MissingSetting("STRATO_TOKEN"))?;
        let domain = std::env::var("STRATO_DOMAIN").unwrap_or_else(|_| default_domain());
        let project_id = std::env::var("STRATO_PROJECT_ID").ok();

        let mut endpoint_overrides = HashMap::new();
        for (key, value) in std::env::vars() {
            if let Some(service) = key.strip_prefix("STRATO_ENDPOINT_") {
                endpoint_overrides.insert(service.to_lowercase(), value);
            }
        }

        let config = Self {
            region,
            domain,
            auth_token,
            project_id,
            endpoint_overrides,
            max_retries: default_max_retries(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse from the host's JSON configuration block.
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(raw.clone())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::Invalid("region must not be empty".to_string()));
        }
        if self.auth_token.is_empty() {
            return Err(ConfigError::Invalid(
                "auth_token must not be empty".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_with_defaults() {
        let config = ProviderConfig::from_json(&json!({
            "region": "eu-1",
            "auth_token": "tok"
        }))
        .unwrap();
        assert_eq!(config.domain, "stratus.cloud");
        assert_eq!(config.max_retries, 3);
        assert!(config.endpoint_overrides.is_empty());
    }

    #[test]
    fn empty_region_rejected() {
        let result = ProviderConfig::from_json(&json!({
            "region": "",
            "auth_token": "tok"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn overrides_parse() {
        let config = ProviderConfig::from_json(&json!({
            "region": "eu-1",
            "auth_token": "tok",
            "endpoint_overrides": {"iam": "http://127.0.0.1:9000"}
        }))
        .unwrap();
        assert_eq!(
            config.endpoint_overrides.get("iam").map(String::as_str),
            Some("http://127.0.0.1:9000")
        );
    }
}
