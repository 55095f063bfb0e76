//! Web application firewall resource types
//!
//! Protected domains and policy rules, both synchronous CRUD. Rules are
//! addressed underneath their policy, so their composite id is
//! `policy_id/rule_id`.

pub mod api;
pub mod domain;
pub mod rule;

use stratoform_engine::RegistryBuilder;

/// Register every WAF resource type.
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(domain::descriptor())
        .register(rule::descriptor())
}
