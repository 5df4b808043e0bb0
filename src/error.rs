//! Error types for the Lockin server
//!
//! This module provides the crate-level error hierarchy using `thiserror`
//! and its mapping onto HTTP responses. Handlers return `Result<_, Error>`
//! and the [`axum::response::IntoResponse`] impl turns every failure into
//! the JSON error body the frontend expects.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::billing::{GatewayError, WebhookError};
use crate::storage::StorageError;
use crate::store::StoreError;

/// The main error type for Lockin server operations
#[derive(Error, Debug)]
pub enum Error {
    /// Principal resolution errors
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Webhook reconciliation errors
    #[error("webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Entitlement store errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payment gateway errors
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Release storage errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The request is malformed (missing field, unsupported parameter)
    #[error("{0}")]
    BadRequest(String),

    /// The principal is authenticated but not allowed to do this
    #[error("{0}")]
    Forbidden(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Lockin server operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status this error answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            Self::Auth(AuthError::Provider(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Webhook(e) => e.status_code(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Store(_) | Self::Gateway(_) | Self::Storage(_) | Self::Io(_) | Self::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show the caller. Internal failures collapse to a
    /// generic line; details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Auth(AuthError::Unauthenticated) => "Not authenticated".to_string(),
            Self::BadRequest(msg) | Self::Forbidden(msg) => msg.clone(),
            Self::Webhook(e) if e.status_code() == StatusCode::BAD_REQUEST => e.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
