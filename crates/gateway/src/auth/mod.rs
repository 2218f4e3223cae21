//! Authentication module for JWT-based auth with GitHub OAuth login.
//!
//! This module provides:
//! - Anti-forgery state generation and single-use binding
//! - The identity provider seam and its GitHub implementation
//! - Primary/verified email selection and the email domain allow-list
//! - JWT token creation and validation
//! - `require_auth` middleware for protecting routes

mod handlers;
pub mod identity;
pub mod jwt;
mod middleware;
pub mod provider;
pub mod state;
pub mod types;

use axum::http::StatusCode;
use thiserror::Error;

pub use handlers::{auth_callback, auth_login, secure, user_info};
pub use identity::{select_primary_verified, verify_identity, DomainPolicy};
pub use jwt::TokenService;
pub use middleware::{bearer_token, require_auth};
pub use provider::{EmailRecord, GithubProvider, IdentityProvider, ProviderCredential};
pub use state::{generate_state, PendingStates};
pub use types::{AuthUser, Claims};

/// Failures of the login flow and of bearer token validation.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("secure random source unavailable: {0}")]
    RandomSource(#[source] rand::Error),

    #[error("OAuth state missing, expired or not issued to this browser")]
    StateMismatch,

    #[error("too many logins awaiting their callback")]
    LoginCapacityExceeded,

    #[error("authorization code exchange failed: {0}")]
    OAuthExchangeFailed(String),

    #[error("fetching provider email addresses failed: {0}")]
    IdentityFetchFailed(String),

    #[error("no primary verified email address")]
    IdentityUnresolved,

    #[error("email domain {domain:?} is not allowed (allowed: {allowed})")]
    DomainNotAllowed { domain: String, allowed: String },

    #[error("token issuance failed: {0}")]
    TokenIssue(#[source] jsonwebtoken::errors::Error),

    #[error("no bearer token provided")]
    Unauthenticated,

    #[error("invalid bearer token")]
    InvalidToken,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::RandomSource(_) | AuthError::TokenIssue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AuthError::StateMismatch => StatusCode::BAD_REQUEST,
            AuthError::LoginCapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::OAuthExchangeFailed(_) | AuthError::IdentityFetchFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::IdentityUnresolved | AuthError::DomainNotAllowed { .. } => {
                StatusCode::FORBIDDEN
            }
            AuthError::Unauthenticated | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message that is safe to show an untrusted client. Never includes
    /// provider responses or the reason a token failed verification.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::RandomSource(_) | AuthError::TokenIssue(_) => {
                "Internal server error".to_string()
            }
            AuthError::StateMismatch => "Invalid OAuth state".to_string(),
            AuthError::LoginCapacityExceeded => {
                "Too many login attempts in progress, retry shortly".to_string()
            }
            AuthError::OAuthExchangeFailed(_) => "OAuth exchange failed".to_string(),
            AuthError::IdentityFetchFailed(_) => "Failed to get email".to_string(),
            AuthError::IdentityUnresolved => "No verified primary email".to_string(),
            AuthError::DomainNotAllowed { allowed, .. } => {
                format!("Access restricted to @{} users", allowed)
            }
            AuthError::Unauthenticated => "No token provided".to_string(),
            AuthError::InvalidToken => "Invalid token".to_string(),
        }
    }
}
