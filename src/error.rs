//! Hub error types with HTTP status code mapping.
//!
//! [`HubError`] is the central error type for the hub. Per-connection
//! failures never surface here: they end that connection and are logged.
//! What remains are startup problems and the upgrade rejection, which
//! maps to a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "websocket handshake rejected: ...",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Hub error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Configuration   | 500 Internal Server Error    |
/// | 2000–2999 | Handshake       | 404 Not Found                |
/// | 3000–3999 | Server          | 500 / 503                    |
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The request could not be upgraded to a WebSocket.
    #[error("websocket handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The coordinator's control loop no longer accepts events.
    #[error("hub coordinator is not running")]
    CoordinatorClosed,

    /// An envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(_) => 1001,
            Self::HandshakeRejected(_) => 2001,
            Self::Encode(_) => 3001,
            Self::CoordinatorClosed => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::HandshakeRejected(_) => StatusCode::NOT_FOUND,
            Self::CoordinatorClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Encode(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn handshake_rejection_is_not_found() {
        let err = HubError::HandshakeRejected("missing upgrade header".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2001);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn closed_coordinator_is_unavailable() {
        assert_eq!(
            HubError::CoordinatorClosed.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn encode_errors_convert() {
        let Err(json_err) = serde_json::from_str::<u8>("nope") else {
            panic!("expected a parse error");
        };
        let err = HubError::from(json_err);
        assert!(err.to_string().starts_with("failed to encode envelope"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
