//! Unified error handling for the gateway API.
//!
//! This module provides a centralized error type that implements `IntoResponse`,
//! allowing handlers to use `?` operator naturally while returning appropriate
//! HTTP status codes and client-safe error messages.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared_types::ErrorResponse;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::auth::AuthError;

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Login flow or bearer token failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Artifact storage failure
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Malformed or oversized multipart body
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Anything else
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Auth(e) => {
                let status = e.status();
                match e {
                    AuthError::LoginCapacityExceeded => tracing::warn!("Login refused: {}", e),
                    _ if status.is_server_error() => tracing::error!("Auth error: {}", e),
                    _ => tracing::debug!("Auth rejected: {}", e),
                }
                (status, e.client_message())
            }
            ApiError::Artifact(e) => {
                let status = e.status();
                match e {
                    ArtifactError::PartialUploadFailure { .. } => {
                        tracing::error!("Artifact store needs manual reconciliation: {}", e)
                    }
                    _ if status.is_server_error() => tracing::error!("Artifact error: {}", e),
                    _ => tracing::debug!("Artifact request rejected: {}", e),
                }
                (status, e.client_message())
            }
            ApiError::Multipart(e) => {
                tracing::warn!("Multipart error: {}", e);
                (e.status(), e.body_text())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(error_message))).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
