//! Identity resource types
//!
//! Users and groups on the identity service, including group membership as
//! a reconciled sub-resource and user import with a list-by-name fallback.

pub mod api;
pub mod group;
pub mod user;

use stratoform_engine::RegistryBuilder;

/// Register every identity resource type.
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(user::descriptor())
        .register(group::descriptor())
}
