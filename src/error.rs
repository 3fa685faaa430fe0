//! Error types for the gateway.
//!
//! Collaborator failures propagate unchanged to the caller as one of these
//! kinds; there is no retry or recovery logic anywhere in the service.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error type for REST operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// An entity reference did not resolve.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The caller lacks the required access level.
    #[error("{0}")]
    PermissionDenied(String),

    /// The route requires a logged-in caller and none was presented.
    #[error("authentication required")]
    Unauthorized,

    /// A request parameter was malformed.
    #[error("invalid parameter {param}: {reason}")]
    Validation { param: &'static str, reason: String },

    /// The container engine rejected or failed an operation. Only the
    /// runner produces this; the submit route returns before any engine
    /// call happens.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
