//! Error types for Keyway
//!
//! Every failure in the request path is an `AppError`. The HTTP boundary turns
//! it into a JSON envelope with a stable machine-readable code; nothing below
//! the boundary builds responses itself.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input or credential
    #[error("{0}")]
    Validation(String),

    /// Per-field payload validation failures
    #[error("invalid request payload")]
    InvalidFields(BTreeMap<String, String>),

    /// Well-formed credential that is not in the directory
    #[error("wrong virtual key")]
    UnknownVirtualKey,

    #[error("{message}")]
    QuotaExceeded { message: String, limit: u64, used: u64 },

    /// Upstream non-2xx reply or transport failure
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// A virtual key points at a provider this build does not know
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Additional error details
#[derive(Debug, Default, Serialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    /// Error chain, development mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

impl ErrorDetails {
    fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.used.is_none()
            && self.upstream_status.is_none()
            && self.debug.is_none()
    }
}

/// Field-level validation response (`{"errors": {...}}`)
#[derive(Debug, Serialize)]
pub struct FieldErrorsResponse {
    pub errors: BTreeMap<String, String>,
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownVirtualKey => StatusCode::FORBIDDEN,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::UnknownProvider(_) | AppError::JsonError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) => "VALIDATION_ERROR",
            AppError::UnknownVirtualKey => "INVALID_VIRTUAL_KEY",
            AppError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            AppError::Upstream { .. } => "LLM_PROVIDER_ERROR",
            AppError::UnknownProvider(_) | AppError::JsonError(_) | AppError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Whether this is an internal (server-side) failure
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::UnknownProvider(_) | AppError::JsonError(_) | AppError::Internal(_)
        )
    }

    /// Whether the failure came from the upstream provider
    pub fn is_upstream(&self) -> bool {
        matches!(self, AppError::Upstream { .. })
    }

    /// Build the HTTP response for this error
    ///
    /// Outside development mode internal messages are replaced with a generic
    /// one and no debug details are attached.
    pub fn into_response_with_mode(self, development: bool) -> Response {
        let status = self.status_code();

        if let AppError::InvalidFields(errors) = self {
            return (status, Json(FieldErrorsResponse { errors })).into_response();
        }

        let mut details = ErrorDetails::default();
        match &self {
            AppError::QuotaExceeded { limit, used, .. } => {
                details.limit = Some(*limit);
                details.used = Some(*used);
            }
            AppError::Upstream { status, .. } => {
                details.upstream_status = Some(*status);
            }
            _ => {}
        }
        if development {
            details.debug = Some(format!("{:?}", self));
        }

        let message = if self.is_internal() && !development {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            code: self.code().to_string(),
            message,
            details: if details.is_empty() { None } else { Some(details) },
        };

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with_mode(false)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
