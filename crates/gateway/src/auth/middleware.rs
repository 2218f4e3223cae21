//! Authentication middleware layer for protecting routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::AppState;

use super::types::AuthUser;
use super::AuthError;

/// Middleware function that requires a valid bearer token.
///
/// Use with `axum::middleware::from_fn_with_state`. On success the caller's
/// [`AuthUser`] is available to handlers as `Extension<AuthUser>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let claims = match bearer_token(request.headers()).and_then(|token| state.tokens.verify(token))
    {
        Ok(claims) => claims,
        Err(err) => return ApiError::from(err).into_response(),
    };

    request.extensions_mut().insert(AuthUser {
        email: claims.email,
    });

    next.run(request).await
}

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// A missing header is `Unauthenticated`; anything else that is not a
/// non-empty bearer token, including a bare `Bearer`, is `InvalidToken`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::InvalidToken)?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(AuthError::InvalidToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token)
}
