//! Client error types

use stratoform_core::{Diagnostic, ErrorKind};
use thiserror::Error;

/// A classified remote API failure.
///
/// This is the only error shape handlers see for remote calls; the kind
/// drives every recovery decision.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// HTTP status when there was a response
    pub status: Option<u16>,
    /// Provider error code from the envelope
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
            request_id: None,
        }
    }

    /// A network-level failure with no response to classify.
    pub fn transport(err: &reqwest::Error) -> Self {
        Self::new(ErrorKind::Transient, format!("transport error: {}", err))
    }

    /// A response body that could not be decoded. Never a panic; always
    /// surfaced as Unknown with the raw payload attached.
    pub fn decode(context: &str, body: &str) -> Self {
        let truncated: String = body.chars().take(512).collect();
        Self::new(
            ErrorKind::Unknown,
            format!("{}: undecodable response body: {}", context, truncated),
        )
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn is_gone(&self) -> bool {
        self.kind == ErrorKind::Gone
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Render as an error diagnostic with `summary` as the headline.
    pub fn to_diagnostic(&self, summary: impl Into<String>) -> Diagnostic {
        let mut diag = Diagnostic::error(summary)
            .with_detail(self.message.clone())
            .with_kind(self.kind);
        if let Some(id) = &self.request_id {
            diag = diag.with_request_id(id.clone());
        }
        diag
    }
}

/// Errors raised while constructing clients, as opposed to using them.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No endpoint for service `{service}` in region `{region}`")]
    EndpointNotResolved { service: String, region: String },

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
