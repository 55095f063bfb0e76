//! Direct-connect resource types
//!
//! Circuits provision asynchronously (`PENDING_CREATE → ACTIVE`); the
//! physical endpoint is fixed at creation, only bandwidth changes in
//! place.

pub mod api;
pub mod circuit;

use stratoform_engine::RegistryBuilder;

/// Register every direct-connect resource type.
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder.register(circuit::descriptor())
}
