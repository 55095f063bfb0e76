//! Orchestration stack resource type
//!
//! Stacks drive the orchestration service's own state machine:
//! `*_IN_PROGRESS` states poll into `*_COMPLETE`, `*_FAILED` and
//! `ROLLBACK_*` are terminal errors carrying the remote reason.

pub mod api;
pub mod stack;

use stratoform_engine::RegistryBuilder;

/// Register every orchestration resource type.
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder.register(stack::descriptor())
}
