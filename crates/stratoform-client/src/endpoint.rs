//! Per-service endpoint resolution
//!
//! The default scheme is `https://{service}.{region}.{domain}`. Explicit
//! overrides short-circuit the template; tests use them to point a service
//! at a local mock server.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EndpointResolver {
    domain: String,
    overrides: HashMap<String, String>,
}

impl EndpointResolver {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            overrides: HashMap::new(),
        }
    }

    /// Pin `service` to a fixed base URL regardless of region.
    pub fn with_override(mut self, service: impl Into<String>, url: impl Into<String>) -> Self {
        self.overrides
            .insert(service.into(), url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn set_override(&mut self, service: impl Into<String>, url: impl Into<String>) {
        self.overrides
            .insert(service.into(), url.into().trim_end_matches('/').to_string());
    }

    /// Base URL for `service` in `region`, without a version path.
    pub fn resolve(&self, service: &str, region: &str) -> String {
        if let Some(url) = self.overrides.get(service) {
            return url.clone();
        }
        format!("https://{}.{}.{}", service, region, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_resolution() {
        let resolver = EndpointResolver::new("stratus.example");
        assert_eq!(
            resolver.resolve("iam", "eu-1"),
            "https://iam.eu-1.stratus.example"
        );
    }

    #[test]
    fn override_wins_and_is_trimmed() {
        let resolver = EndpointResolver::new("stratus.example")
            .with_override("iam", "http://127.0.0.1:9999/");
        assert_eq!(resolver.resolve("iam", "eu-1"), "http://127.0.0.1:9999");
        assert_eq!(
            resolver.resolve("cbr", "eu-1"),
            "https://cbr.eu-1.stratus.example"
        );
    }
}
