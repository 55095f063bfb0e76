//! Remote error classification
//!
//! Maps an HTTP status plus the documented error envelope
//! `{"error": {"code", "message", "request_id"?}}` onto the error taxonomy.
//! Anything the classifier does not recognize is Unknown, with the raw
//! payload preserved in the message.

use crate::error::ApiError;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::HashSet;
use stratoform_core::ErrorKind;

#[derive(Debug, Deserialize)]
struct Envelope {
    error: EnvelopeBody,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

/// Classify a status code, refined by the provider error code when one is
/// present in the envelope.
pub fn classify_status(status: u16, code: Option<&str>) -> ErrorKind {
    // Provider codes take precedence over the raw status for the cases the
    // gateway reports with a generic 400.
    if let Some(code) = code {
        if is_not_found_code(code) {
            return ErrorKind::Gone;
        }
        if is_throttle_code(code) {
            return ErrorKind::Throttled;
        }
    }

    match status {
        404 | 410 => ErrorKind::Gone,
        409 => ErrorKind::Conflict,
        429 => ErrorKind::Throttled,
        400 | 422 => ErrorKind::InvalidInput,
        401 | 403 => ErrorKind::Unauthorized,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Unknown,
    }
}

/// Gateway codes that mean "slow down" regardless of the raw status.
static THROTTLE_CODES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["TooManyRequests", "APIGW.0308", "Ratelimit.Exceeded"]));

fn is_not_found_code(code: &str) -> bool {
    code.ends_with(".NotFound") || code.ends_with("_NOT_FOUND") || code == "NoSuchResource"
}

fn is_throttle_code(code: &str) -> bool {
    THROTTLE_CODES.contains(code) || code.contains("Throttl")
}

/// Build an [`ApiError`] from a non-success response body.
///
/// Accepts the documented envelope, a flat `{code, message}` object, or any
/// other payload (classified by status alone, raw body in the message).
pub fn error_from_body(status: u16, body: &str, header_request_id: Option<String>) -> ApiError {
    let parsed: Option<(Option<String>, Option<String>, Option<String>)> =
        serde_json::from_str::<Envelope>(body)
            .ok()
            .map(|e| (e.error.code, e.error.message, e.error.request_id))
            .or_else(|| {
                serde_json::from_str::<EnvelopeBody>(body)
                    .ok()
                    .filter(|b| b.code.is_some() || b.message.is_some())
                    .map(|b| (b.code, b.message, b.request_id))
            });

    let (code, message, request_id) = match parsed {
        Some(parts) => parts,
        None => {
            let raw: String = body.trim().chars().take(512).collect();
            (None, if raw.is_empty() { None } else { Some(raw) }, None)
        }
    };

    let kind = classify_status(status, code.as_deref());
    let mut err = ApiError::new(
        kind,
        message.unwrap_or_else(|| format!("HTTP {}", status)),
    )
    .with_status(status);
    if let Some(code) = code {
        err = err.with_code(code);
    }
    if let Some(id) = request_id.or(header_request_id) {
        err = err.with_request_id(id);
    }
    err
}

/// Extract a field path from an InvalidInput message when the provider
/// formats one in (`"field 'name': ..."` or `"parameter name is invalid"`).
pub fn field_path_from_message(message: &str) -> Option<String> {
    if let Some(start) = message.find("field '") {
        let rest = &message[start + 7..];
        if let Some(end) = rest.find('\'') {
            return Some(rest[..end].to_string());
        }
    }
    if let Some(rest) = message.strip_prefix("parameter ") {
        if let Some(end) = rest.find(" is invalid") {
            return Some(rest[..end].to_string());
        }
    }
    None
}

/// Decode a JSON payload out of a success response; tolerates empty bodies.
pub fn decode_success(body: &str) -> std::result::Result<Json, ApiError> {
    if body.trim().is_empty() {
        return Ok(Json::Null);
    }
    serde_json::from_str(body).map_err(|_| ApiError::decode("response", body))
}
