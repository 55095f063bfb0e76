//! Backup resource types
//!
//! Vaults with asynchronous provisioning and a tag sub-resource, backup
//! policies, and the vault-to-policy binding resource.

pub mod api;
pub mod policy;
pub mod vault;

use stratoform_engine::RegistryBuilder;

/// Register every backup resource type.
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(vault::descriptor())
        .register(policy::descriptor())
        .register(policy::binding_descriptor())
}
