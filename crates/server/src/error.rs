//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use memo_metadata::MetadataError;
use memo_metadata::wire::{CODE_DETERMINISM_CONFLICT, CODE_RETRIES_EXHAUSTED, ErrorBody};

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("at capacity: {0}")]
    AtCapacity(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("invalid input: {0}")]
    Core(#[from] memo_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
            Self::AtCapacity(_) => "at_capacity",
            Self::Core(_) => "bad_request",
            Self::Metadata(e) => match e {
                MetadataError::DeterminismConflict { .. } => CODE_DETERMINISM_CONFLICT,
                MetadataError::RetriesExhausted { .. } => CODE_RETRIES_EXHAUSTED,
                MetadataError::Core(_) => "bad_request",
                MetadataError::Corrupt { .. } => "corrupt_record",
                MetadataError::Timeout { .. } => "timeout",
                MetadataError::Remote { .. } | MetadataError::Http(_) => "upstream_error",
                e if e.is_transient() => "unavailable",
                _ => "metadata_error",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AtCapacity(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Metadata(e) => match e {
                MetadataError::DeterminismConflict { .. }
                | MetadataError::RetriesExhausted { .. } => StatusCode::CONFLICT,
                MetadataError::Core(_) => StatusCode::BAD_REQUEST,
                MetadataError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                MetadataError::Remote { .. } | MetadataError::Http(_) => StatusCode::BAD_GATEWAY,
                e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        crate::metrics::record_error(self.code());
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
