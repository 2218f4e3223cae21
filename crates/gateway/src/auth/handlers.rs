//! Authentication HTTP handlers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use shared_types::{ErrorResponse, SecureResponse, TokenResponse, UserResponse};

use crate::error::ApiResult;
use crate::AppState;

use super::identity::verify_identity;
use super::state::{build_state_cookie, clear_state_cookie, validate_callback_state};
use super::types::AuthUser;
use super::AuthError;

/// Start the GitHub OAuth login flow.
///
/// Redirects the browser to the provider and binds the generated state to it
/// with a short-lived cookie.
pub async fn auth_login(State(state): State<AppState>) -> ApiResult<Response> {
    let csrf_state = state.pending_states.issue()?;
    let auth_url = state.provider.authorization_url(&csrf_state);

    tracing::debug!("Redirecting to identity provider for login");

    let cookie = build_state_cookie(
        &csrf_state,
        state.pending_states.ttl(),
        state.config.secure_cookies,
    );

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, auth_url),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Handle the provider callback.
///
/// Checks the state binding, exchanges the code, resolves the primary verified
/// email, applies the domain allow-list and issues a token. Browsers are
/// redirected to the frontend either way; callers that ask for JSON get the
/// token or the error as a JSON body.
pub async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthCallbackParams>,
) -> Response {
    let wants_json = accepts_json(&headers);
    let clear_cookie = clear_state_cookie(state.config.secure_cookies);

    let response = match handle_callback_inner(&state, &headers, params).await {
        Ok(token) if wants_json => Json(TokenResponse { token }).into_response(),
        Ok(token) => {
            let location = format!(
                "{}/login-success?token={}",
                state.config.frontend_url,
                urlencoding::encode(&token)
            );
            found(location)
        }
        Err(e) => {
            match &e {
                AuthError::DomainNotAllowed { domain, .. } => {
                    tracing::warn!("Login rejected for domain {}", domain)
                }
                AuthError::IdentityUnresolved | AuthError::StateMismatch => {
                    tracing::warn!("Login rejected: {}", e)
                }
                _ => tracing::error!("Auth callback error: {}", e),
            }

            if wants_json {
                (e.status(), Json(ErrorResponse::new(e.client_message()))).into_response()
            } else {
                let location = format!(
                    "{}/login-error?message={}",
                    state.config.frontend_url,
                    urlencoding::encode(&e.client_message())
                );
                found(location)
            }
        }
    };

    let (mut parts, body) = response.into_parts();
    if let Ok(cookie_value) = clear_cookie.parse() {
        parts.headers.append(header::SET_COOKIE, cookie_value);
    }
    Response::from_parts(parts, body)
}

async fn handle_callback_inner(
    state: &AppState,
    headers: &HeaderMap,
    params: AuthCallbackParams,
) -> Result<String, AuthError> {
    let presented = params.state.unwrap_or_default();
    validate_callback_state(&state.pending_states, headers, &presented)?;

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthError::OAuthExchangeFailed("callback carried no code".to_string()))?;

    let credential = state.provider.exchange_code(&code).await?;
    let email = verify_identity(state.provider.as_ref(), &credential, &state.domain_policy).await?;
    drop(credential);

    let token = state.tokens.issue(&email)?;
    tracing::info!("Successful login for: {}", email);

    Ok(token)
}

fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false)
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Protected greeting.
pub async fn secure(Extension(user): Extension<AuthUser>) -> Json<SecureResponse> {
    Json(SecureResponse {
        message: "Welcome!".to_string(),
        email: user.email,
    })
}

/// Get current authenticated user info.
pub async fn user_info(Extension(user): Extension<AuthUser>) -> Json<UserResponse> {
    Json(UserResponse { email: user.email })
}
