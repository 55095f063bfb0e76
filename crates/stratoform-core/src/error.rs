//! Core error types

use thiserror::Error;

/// Errors raised while building or validating resource schemas
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid schema for {type_name}: field `{field}`: {reason}")]
    InvalidFieldSpec {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("Invalid schema for {type_name}: {reason}")]
    InvalidSchema { type_name: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
