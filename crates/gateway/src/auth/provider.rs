//! Identity provider client.
//!
//! The login flow only needs three things from the provider: the URL to send
//! the browser to, a code-for-credential exchange, and the list of email
//! addresses on the account. [`IdentityProvider`] captures exactly that so the
//! handlers can run against a fake in tests.

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Url};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;

use super::AuthError;

/// Access credential returned by the provider's token endpoint. Used once to
/// read the account's email addresses, then dropped.
pub struct ProviderCredential(Secret<String>);

impl ProviderCredential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self(Secret::new(access_token.into()))
    }

    pub fn access_token(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderCredential([REDACTED])")
    }
}

/// One entry of the provider's "list emails" response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    #[serde(rename = "email")]
    pub address: String,
    #[serde(rename = "primary", default)]
    pub is_primary: bool,
    #[serde(rename = "verified", default)]
    pub is_verified: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL for a login attempt carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Swap an authorization code for an access credential.
    async fn exchange_code(&self, code: &str) -> Result<ProviderCredential, AuthError>;

    /// List the email addresses attached to the credential's account.
    async fn fetch_emails(
        &self,
        credential: &ProviderCredential,
    ) -> Result<Vec<EmailRecord>, AuthError>;
}

/// GitHub OAuth app client.
pub struct GithubProvider {
    http: reqwest::Client,
    authorize_url: Url,
    config: ProviderConfig,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

/// GitHub answers a bad code with `200 OK` and an `error` field, so both
/// shapes are decoded into one struct.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

impl GithubProvider {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let authorize_url = Url::parse(&config.authorize_url)
            .with_context(|| format!("invalid authorize URL {}", config.authorize_url))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build provider HTTP client")?;

        Ok(Self {
            http,
            authorize_url,
            config,
        })
    }

    fn emails_url(&self) -> String {
        format!("{}/user/emails", self.config.api_url)
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderCredential, AuthError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&TokenRequest {
                client_id: &self.config.client_id,
                client_secret: self.config.client_secret.expose_secret(),
                code,
                redirect_uri: &self.config.redirect_uri,
            })
            .send()
            .await
            .map_err(|e| AuthError::OAuthExchangeFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::OAuthExchangeFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::OAuthExchangeFailed(format!("invalid response: {}", e)))?;

        match (body.access_token, body.error) {
            (_, Some(error)) => Err(AuthError::OAuthExchangeFailed(format!(
                "provider error {}",
                error
            ))),
            (Some(token), None) if !token.is_empty() => Ok(ProviderCredential::new(token)),
            _ => Err(AuthError::OAuthExchangeFailed(
                "response had no access token".to_string(),
            )),
        }
    }

    async fn fetch_emails(
        &self,
        credential: &ProviderCredential,
    ) -> Result<Vec<EmailRecord>, AuthError> {
        let response = self
            .http
            .get(self.emails_url())
            .bearer_auth(credential.access_token())
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AuthError::IdentityFetchFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::IdentityFetchFailed(format!(
                "emails endpoint returned {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::IdentityFetchFailed(format!("invalid response: {}", e)))
    }
}
