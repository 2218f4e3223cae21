#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use gateway::{
    auth::{AuthError, EmailRecord, IdentityProvider, ProviderCredential},
    build_router,
    config::GatewayConfig,
    AppState,
};
use tower::ServiceExt;

pub const FRONTEND_URL: &str = "http://frontend.test";
pub const ALLOWED_DOMAIN: &str = "allowed_domain.com";
pub const JWT_SECRET: &str = "integration-test-secret";
pub const GOOD_CODE: &str = "good-code";

/// Provider double: accepts only [`GOOD_CODE`] and reports a fixed email list.
pub struct FakeProvider {
    pub emails: Vec<EmailRecord>,
}

impl FakeProvider {
    pub fn with_primary(address: &str) -> Self {
        Self {
            emails: vec![email(address, true, true)],
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://idp.test/authorize?client_id=test&state={}", state)
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderCredential, AuthError> {
        if code == GOOD_CODE {
            Ok(ProviderCredential::new("provider-access-token"))
        } else {
            Err(AuthError::OAuthExchangeFailed("bad_verification_code".to_string()))
        }
    }

    async fn fetch_emails(
        &self,
        _credential: &ProviderCredential,
    ) -> Result<Vec<EmailRecord>, AuthError> {
        Ok(self.emails.clone())
    }
}

pub fn email(address: &str, is_primary: bool, is_verified: bool) -> EmailRecord {
    EmailRecord {
        address: address.to_string(),
        is_primary,
        is_verified,
    }
}

pub fn test_config(artifact_dir: &Path, extra: &[(&str, &str)]) -> GatewayConfig {
    let mut env: HashMap<String, String> = [
        ("GITHUB_CLIENT_ID", "test-client"),
        ("GITHUB_CLIENT_SECRET", "test-secret"),
        ("GITHUB_REDIRECT_URI", "http://gateway.test/auth/callback"),
        ("JWT_SECRET", JWT_SECRET),
        ("ALLOWED_DOMAIN", ALLOWED_DOMAIN),
        ("FRONTEND_URL", FRONTEND_URL),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    env.insert(
        "ARTIFACT_DIR".to_string(),
        artifact_dir.to_string_lossy().into_owned(),
    );
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }

    GatewayConfig::from_lookup(|key| env.get(key).cloned()).expect("test config should load")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new(provider: FakeProvider) -> Self {
        Self::with_env(provider, &[])
    }

    pub fn with_env(provider: FakeProvider, extra: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(dir.path(), extra);
        let state = AppState::with_provider(config, Arc::new(provider));
        Self {
            router: build_router(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_with_token(&self, uri: &str, token: &str) -> Response<Body> {
        let request = Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn upload(&self, uri: &str, token: &str, contents: &str) -> Response<Body> {
        self.send(multipart_request(uri, token, "file", contents)).await
    }

    pub fn token_for(&self, email: &str) -> String {
        self.state.tokens.issue(email).expect("token should issue")
    }

    /// Start a login and return the issued state.
    pub async fn begin_login(&self) -> String {
        let response = self.get("/auth/login").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = header_str(&response, header::LOCATION);
        location
            .split("state=")
            .nth(1)
            .expect("authorization URL carries state")
            .to_string()
    }

    pub async fn callback(&self, code: &str, state: &str, cookie: Option<&str>) -> Response<Body> {
        self.callback_with_accept(code, state, cookie, None).await
    }

    pub async fn callback_with_accept(
        &self,
        code: &str,
        state: &str,
        cookie: Option<&str>,
        accept: Option<&str>,
    ) -> Response<Body> {
        let mut request =
            Request::get(format!("/auth/callback?code={}&state={}", code, state));
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, format!("oauth_state={}", cookie));
        }
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }
}

pub fn multipart_request(uri: &str, token: &str, field: &str, contents: &str) -> Request<Body> {
    let boundary = "gateway-test-boundary";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"swagger.yaml\"\r\n\
         Content-Type: application/yaml\r\n\
         \r\n\
         {contents}\r\n\
         --{b}--\r\n",
        b = boundary,
        field = field,
        contents = contents,
    );

    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn header_str(response: &Response<Body>, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec()
}

pub async fn body_json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
