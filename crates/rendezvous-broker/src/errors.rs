//! Broker error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse`
//! impl. Store and issuer failures are logged server-side and surfaced to
//! clients with generic messages to avoid leaking internal details.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Rendezvous broker error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400 (missing/invalid client IP, malformed or unknown
///   token, invalid endpoint code, per-IP quota exceeded)
/// - Unauthorized: 401 (IP/token mismatch, banned IP)
/// - PreconditionFailed: 412 (refresh with no existing channel)
/// - Store, Internal: 500 (store failure, issuer failure, corrupt record)
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Internal server error")]
    Internal,
}

impl BrokerError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::Store(_) | BrokerError::Internal => 500,
            BrokerError::BadRequest(_) => 400,
            BrokerError::Unauthorized(_) => 401,
            BrokerError::PreconditionFailed(_) => 412,
        }
    }
}

/// Failure body: `{"statusCode": N, "error": "..."}`.
#[derive(Serialize)]
struct ErrorResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    error: String,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            BrokerError::Store(err) => {
                // Log actual error server-side, return generic message
                tracing::error!(target: "broker.store", error = %err, "Store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Fatal server error.".to_string(),
                )
            }
            BrokerError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            BrokerError::Unauthorized(reason) => (StatusCode::UNAUTHORIZED, reason.clone()),
            BrokerError::PreconditionFailed(reason) => {
                (StatusCode::PRECONDITION_FAILED, reason.clone())
            }
            BrokerError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error.".to_string(),
            ),
        };

        let body = ErrorResponse {
            status_code: status.as_u16(),
            error: message,
        };

        (status, Json(body)).into_response()
    }
}
