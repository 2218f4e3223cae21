//! Gateway configuration loaded from the environment.
//!
//! Everything is read once at startup into an immutable [`GatewayConfig`]
//! that is shared behind an `Arc`. Missing or malformed values are fatal.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::Secret;
use thiserror::Error;

use crate::auth::DomainPolicy;

const DEFAULT_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const DEFAULT_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_SCOPE: &str = "user:email";
const DEFAULT_ARTIFACT_DIR: &str = "./uploads";
const DEFAULT_ARTIFACT_NAME: &str = "swagger.yaml";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATE_TTL_SECS: u64 = 600;
const DEFAULT_MAX_PENDING_STATES: usize = 10_000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Top-level route segments the artifact may not shadow when served publicly.
const RESERVED_ROUTES: [&str; 7] = ["artifact", "auth", "health", "ping", "secure", "upload", "user"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// OAuth application registered with the identity provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_url: String,
    pub scope: String,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Where the current artifact lives and how it is exposed.
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    pub name: String,
    /// Also serve the artifact unauthenticated at `/<name>`.
    pub public: bool,
    pub max_upload_bytes: usize,
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub jwt_secret: Secret<String>,
    pub domain_policy: DomainPolicy,
    /// Base URL of the frontend, without a trailing slash.
    pub frontend_url: String,
    pub state_ttl: Duration,
    /// Upper bound on logins awaiting their callback.
    pub max_pending_states: usize,
    pub secure_cookies: bool,
    pub artifact: ArtifactConfig,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind_addr", &self.bind_addr)
            .field("provider", &self.provider)
            .field("jwt_secret", &"[REDACTED]")
            .field("domain_policy", &self.domain_policy)
            .field("frontend_url", &self.frontend_url)
            .field("state_ttl", &self.state_ttl)
            .field("max_pending_states", &self.max_pending_states)
            .field("secure_cookies", &self.secure_cookies)
            .field("artifact", &self.artifact)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

impl GatewayConfig {
    /// Load configuration from process environment variables.
    ///
    /// Required env vars:
    /// - `GITHUB_CLIENT_ID`, `GITHUB_CLIENT_SECRET`, `GITHUB_REDIRECT_URI`
    /// - `JWT_SECRET`: Secret key for signing tokens
    /// - `ALLOWED_DOMAIN`: Email domain allowed to log in
    /// - `FRONTEND_URL`: Where the callback sends the browser afterwards
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let provider = ProviderConfig {
            client_id: env.required("GITHUB_CLIENT_ID")?,
            client_secret: Secret::new(env.required("GITHUB_CLIENT_SECRET")?),
            redirect_uri: env.required("GITHUB_REDIRECT_URI")?,
            authorize_url: env.or("GITHUB_AUTHORIZE_URL", DEFAULT_AUTHORIZE_URL),
            token_url: env.or("GITHUB_TOKEN_URL", DEFAULT_TOKEN_URL),
            api_url: env
                .or("GITHUB_API_URL", DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            scope: env.or("OAUTH_SCOPE", DEFAULT_SCOPE),
            timeout: Duration::from_secs(
                env.parsed("PROVIDER_TIMEOUT_SECS", DEFAULT_PROVIDER_TIMEOUT_SECS)?,
            ),
        };

        if provider.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PROVIDER_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let domain_policy = DomainPolicy::new(env.required("ALLOWED_DOMAIN")?);
        let allowed_domain = domain_policy.allowed_domain();
        if allowed_domain.is_empty() || allowed_domain.contains('@') {
            return Err(ConfigError::Invalid {
                var: "ALLOWED_DOMAIN",
                reason: "expected a bare domain such as example.com".to_string(),
            });
        }

        let artifact_name = env.or("ARTIFACT_NAME", DEFAULT_ARTIFACT_NAME);
        validate_artifact_name(&artifact_name)?;

        let artifact_public = env.parsed("ARTIFACT_PUBLIC", false)?;
        if artifact_public && RESERVED_ROUTES.contains(&artifact_name.as_str()) {
            return Err(ConfigError::Invalid {
                var: "ARTIFACT_NAME",
                reason: format!("/{} is already a gateway route", artifact_name),
            });
        }

        let max_pending_states =
            env.parsed("OAUTH_MAX_PENDING_STATES", DEFAULT_MAX_PENDING_STATES)?;
        if max_pending_states == 0 {
            return Err(ConfigError::Invalid {
                var: "OAUTH_MAX_PENDING_STATES",
                reason: "must be greater than zero".to_string(),
            });
        }

        let bind_addr = env.or("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_addr.parse().map_err(|e| ConfigError::Invalid {
            var: "BIND_ADDR",
            reason: format!("{}", e),
        })?;

        let cors_allowed_origins = env.optional("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Ok(Self {
            bind_addr,
            provider,
            jwt_secret: Secret::new(env.required("JWT_SECRET")?),
            domain_policy,
            frontend_url: env
                .required("FRONTEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            state_ttl: Duration::from_secs(
                env.parsed("OAUTH_STATE_TTL_SECS", DEFAULT_STATE_TTL_SECS)?,
            ),
            max_pending_states,
            secure_cookies: env.optional("RUST_ENV").as_deref() == Some("production"),
            artifact: ArtifactConfig {
                dir: PathBuf::from(env.or("ARTIFACT_DIR", DEFAULT_ARTIFACT_DIR)),
                name: artifact_name,
                public: artifact_public,
                max_upload_bytes: env.parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            },
            cors_allowed_origins,
        })
    }
}

/// The artifact name becomes a route segment and a file name, so it has to be
/// a single plain path component.
fn validate_artifact_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var: "ARTIFACT_NAME",
        reason: reason.to_string(),
    };

    if name.is_empty() || name == "." || name == ".." {
        return Err(invalid("must be a file name"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("must not contain path separators"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not be a hidden file"));
    }
    Ok(())
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}
