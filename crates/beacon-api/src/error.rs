//! API error types and HTTP response mapping.
//!
//! Expected skips never reach this module; they are success-shaped
//! responses. This is only for validation failures (client error, fix and
//! don't blindly retry) and storage failures (server error, safe to retry
//! because the write path is idempotent).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use beacon_ingest::IngestError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message (safe for clients).
    pub message: String,
}

/// HTTP API error with a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Returns an error response for invalid input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Returns an internal error response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Storage { message } => {
                tracing::error!(error = %message, "storage failure during ingestion");
                Self::internal("storage unavailable, retry safe")
            }
            IngestError::Serialization { message } | IngestError::Internal { message } => {
                tracing::error!(error = %message, "internal failure during ingestion");
                Self::internal("internal error")
            }
        }
    }
}

impl From<beacon_core::Error> for ApiError {
    fn from(e: beacon_core::Error) -> Self {
        Self::from(IngestError::from(e))
    }
}
