//! Error taxonomy for the upload subsystem and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;
use thiserror::Error;

/// Domain errors for reservation, confirmation, and reconciliation.
///
/// Each variant carries a fixed retryability: callers may re-issue the same
/// request for retryable errors and must re-reserve from scratch otherwise.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid upload request: {reason}")]
    Validation { reason: String },
    #[error("asset not found")]
    NotFound,
    #[error("reservation expired")]
    Expired,
    #[error("asset is being confirmed by another caller, retry shortly")]
    Conflict,
    #[error("no object found at the reserved storage key")]
    ObjectMissing,
    #[error("uploaded object does not match reservation: declared {declared} bytes, found {actual}")]
    Mismatch { declared: i64, actual: i64 },
    #[error("payload exceeds the {limit}-byte upload ceiling")]
    PayloadTooLarge { limit: i64 },
    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("upload capability is invalid or expired")]
    InvalidCapability,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AssetResult<T> = Result<T, AssetError>;

impl AssetError {
    /// Whether the caller may retry the same request with the same asset id.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssetError::Conflict
                | AssetError::ObjectMissing
                | AssetError::StoreUnavailable(_)
                | AssetError::Sqlx(_)
                | AssetError::Io(_)
        )
    }

    /// Stable machine-readable code for the HTTP body.
    pub fn code(&self) -> &'static str {
        match self {
            AssetError::Validation { .. } => "validation",
            AssetError::NotFound => "not_found",
            AssetError::Expired => "expired",
            AssetError::Conflict => "conflict",
            AssetError::ObjectMissing => "object_missing",
            AssetError::Mismatch { .. } => "mismatch",
            AssetError::PayloadTooLarge { .. } => "payload_too_large",
            AssetError::StoreUnavailable(_) => "store_unavailable",
            AssetError::InvalidCapability => "invalid_capability",
            AssetError::Sqlx(_) | AssetError::Io(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AssetError::Validation { .. } => StatusCode::BAD_REQUEST,
            AssetError::NotFound => StatusCode::NOT_FOUND,
            AssetError::Expired => StatusCode::GONE,
            AssetError::Conflict => StatusCode::CONFLICT,
            AssetError::ObjectMissing => StatusCode::CONFLICT,
            AssetError::Mismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AssetError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AssetError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AssetError::InvalidCapability => StatusCode::FORBIDDEN,
            AssetError::Sqlx(_) | AssetError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A lightweight wrapper for handler errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            code: "error",
            message: msg.into(),
            retryable: false,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: msg.into(),
            retryable: true,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "status": self.status.as_u16(),
            "retryable": self.retryable,
        }));

        (self.status, body).into_response()
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        let retryable = err.is_retryable();
        let status = err.status();
        let code = err.code();
        let message = match &err {
            AssetError::Sqlx(inner) => {
                tracing::error!("database error: {inner}");
                "internal error".to_string()
            }
            AssetError::Io(inner) => {
                tracing::error!("storage I/O error: {inner}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            status,
            code,
            message,
            retryable,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_taxonomy() {
        assert!(AssetError::Conflict.is_retryable());
        assert!(AssetError::ObjectMissing.is_retryable());
        assert!(AssetError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(
            !AssetError::Mismatch {
                declared: 2,
                actual: 3
            }
            .is_retryable()
        );
        assert!(
            !AssetError::Validation {
                reason: "too big".into()
            }
            .is_retryable()
        );
        assert!(!AssetError::Expired.is_retryable());
    }

    #[test]
    fn http_mapping_distinguishes_terminal_from_transient() {
        let conflict: AppError = AssetError::Conflict.into();
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert!(conflict.retryable);

        let mismatch: AppError = AssetError::Mismatch {
            declared: 2_097_152,
            actual: 3_145_728,
        }
        .into();
        assert_eq!(mismatch.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!mismatch.retryable);
    }
}
