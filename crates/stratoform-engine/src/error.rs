//! Engine error types

use thiserror::Error;

/// Fatal configuration errors raised while assembling the registry.
///
/// These abort provider start; nothing here is a runtime failure.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Resource type registered twice: {0}")]
    DuplicateType(String),

    #[error("Resource type `{0}` declares an import format but no `id` field")]
    ImporterWithoutId(String),

    #[error("Unknown resource type: {0}")]
    UnknownType(String),

    #[error(transparent)]
    Schema(#[from] stratoform_core::CoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
