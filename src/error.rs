//! Error types and HTTP error response handling.
//!
//! This module defines the errors that reach the HTTP boundary and how they
//! are converted into responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::store::StoreError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Storage Errors**: database unavailable or failing; the sender retries
/// - **Authentication Errors**: unresolvable webhook secret or API key
/// - **Payload Errors**: webhook body that cannot be normalized
/// - **Resource Errors**: unknown platform or record
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Storage operation failed.
    ///
    /// Returns HTTP 500. Safe to retry: the dedup gate makes redelivery idempotent.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Webhook secret header missing or not matching any active credential.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid or missing webhook secret")]
    Unauthenticated,

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Webhook payload could not be normalized.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Webhook path names a platform we do not ingest.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    /// Requested record does not exist or belongs to another tenant.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": "Human-readable error message",
///   "code": "error_type"
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `Unauthenticated`, `InvalidApiKey` → 401 Unauthorized
/// - `MalformedPayload`, `InvalidRequest` → 400 Bad Request
/// - `UnknownPlatform`, `NotFound` → 404 Not Found
/// - `Store` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key"),
            AppError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, "malformed_payload"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::UnknownPlatform(_) => (StatusCode::NOT_FOUND, "unknown_platform"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let message = match self {
            AppError::Store(ref err) => {
                tracing::error!(error = %err, "request failed on storage");
                "An internal error occurred".to_string()
            }
            ref other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
