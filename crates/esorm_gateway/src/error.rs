//! Error types for gateway operations.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Backend error type reported when an index or template already exists.
pub const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Errors that can occur while talking to the backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never produced a usable response (connection refused,
    /// reset, TLS failure, undecodable success body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a non-success status.
    #[error("backend error: {0}")]
    Backend(BackendError),

    /// A request body could not be encoded or a value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request was rejected before being sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns true for network-level failures, timeouts included.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Returns the normalized backend error, if this is one.
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true when the backend reported that the resource already exists.
    pub fn is_already_exists(&self) -> bool {
        self.backend()
            .is_some_and(|err| err.error_type == ALREADY_EXISTS)
    }

    /// Returns true when the backend reported a version conflict, which is
    /// what a `create` of an existing document id produces.
    pub fn is_conflict(&self) -> bool {
        self.backend().is_some_and(|err| err.status == 409)
    }
}

/// A backend error response normalized to status, type and reason.
///
/// `body` keeps the raw response text so nothing the backend said is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// HTTP status code.
    pub status: u16,
    /// Backend error type, e.g. `index_not_found_exception`.
    pub error_type: String,
    /// Human readable reason.
    pub reason: String,
    /// Raw response body.
    pub body: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured {
        #[serde(rename = "type", default)]
        error_type: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Plain(String),
}

impl BackendError {
    /// Creates a backend error from its parts.
    pub fn new(
        status: u16,
        error_type: impl Into<String>,
        reason: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            status,
            error_type: error_type.into(),
            reason: reason.into(),
            body: body.into(),
        }
    }

    /// Normalizes a raw error response.
    ///
    /// Understands both `{"error": {"type": .., "reason": ..}}` and
    /// `{"error": "text"}`; anything else keeps the body as the reason.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body).into_owned();
        let detail = serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error);

        let (error_type, reason) = match detail {
            Some(ErrorDetail::Structured { error_type, reason }) => {
                (error_type, reason.unwrap_or_default())
            }
            Some(ErrorDetail::Plain(reason)) => (String::new(), reason),
            None => (String::new(), text.clone()),
        };

        Self {
            status,
            error_type,
            reason,
            body: text,
        }
    }

    /// Normalizes the `error` object of a single bulk item.
    pub fn from_item(status: u16, error: &Value) -> Self {
        let error_type = error
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let reason = error
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Self::new(status, error_type, reason, error.to_string())
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error_type.is_empty() {
            write!(f, "[{}] {}", self.status, self.reason)
        } else {
            write!(f, "[{}] {}: {}", self.status, self.error_type, self.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_body() {
        let body = br#"{"error":{"root_cause":[],"type":"resource_already_exists_exception","reason":"index [goiot-device/abc] already exists"},"status":400}"#;
        let err = BackendError::from_response(400, body);
        assert_eq!(err.status, 400);
        assert_eq!(err.error_type, ALREADY_EXISTS);
        assert!(err.reason.contains("already exists"));
        assert!(GatewayError::Backend(err).is_already_exists());
    }

    #[test]
    fn plain_error_body() {
        let err = BackendError::from_response(500, br#"{"error":"boom"}"#);
        assert_eq!(err.error_type, "");
        assert_eq!(err.reason, "boom");
    }

    #[test]
    fn non_json_error_body() {
        let err = BackendError::from_response(502, b"Bad Gateway");
        assert_eq!(err.reason, "Bad Gateway");
        assert_eq!(err.body, "Bad Gateway");
        assert_eq!(err.to_string(), "[502] Bad Gateway");
    }

    #[test]
    fn classification() {
        assert!(GatewayError::transport("refused").is_transport());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(!GatewayError::invalid_request("x").is_transport());

        let conflict = GatewayError::Backend(BackendError::new(
            409,
            "version_conflict_engine_exception",
            "exists",
            "",
        ));
        assert!(conflict.is_conflict());
        assert!(!conflict.is_already_exists());
    }
}
