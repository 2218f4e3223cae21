//! Domain-restricted OAuth gateway guarding a single versioned artifact.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod artifact;
pub mod auth;
pub mod config;
pub mod error;
mod handlers;

use artifact::ArtifactStore;
use auth::{DomainPolicy, GithubProvider, IdentityProvider, PendingStates, TokenService};
use config::GatewayConfig;

/// State shared by every request. Everything except the pending OAuth states
/// and the artifact directory is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub provider: Arc<dyn IdentityProvider>,
    pub tokens: TokenService,
    pub domain_policy: DomainPolicy,
    pub pending_states: Arc<PendingStates>,
    pub artifacts: Arc<ArtifactStore>,
}

impl AppState {
    /// Wire up state with the GitHub provider described by `config`.
    pub fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let provider = GithubProvider::new(config.provider.clone())?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    /// Wire up state around an arbitrary identity provider.
    pub fn with_provider(config: GatewayConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            tokens: TokenService::new(&config.jwt_secret),
            domain_policy: config.domain_policy.clone(),
            pending_states: Arc::new(PendingStates::new(
                config.state_ttl,
                config.max_pending_states,
            )),
            artifacts: Arc::new(ArtifactStore::new(
                config.artifact.dir.clone(),
                config.artifact.name.clone(),
            )),
            provider,
            config: Arc::new(config),
        }
    }
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/secure", get(auth::secure))
        .route("/user", get(auth::user_info))
        .route(
            "/artifact",
            get(artifact::serve_artifact).post(artifact::upload_artifact),
        )
        .route("/upload", axum::routing::post(artifact::upload_artifact))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let mut public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ping", get(handlers::ping))
        .route("/auth/login", get(auth::auth_login))
        .route("/auth/callback", get(auth::auth_callback));

    if state.config.artifact.public {
        let path = format!("/{}", state.config.artifact.name);
        tracing::info!("Serving artifact publicly at {}", path);
        public = public.route(&path, get(artifact::serve_artifact));
    }

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.artifact.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(state.config.cors_allowed_origins.as_deref()))
        .with_state(state)
}

/// Build CORS layer from the configured origins.
///
/// If origins are configured, only those are allowed. Otherwise CORS is
/// permissive (for development only).
fn build_cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins.iter().filter_map(|s| s.parse().ok()).collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                    .allow_credentials(true)
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}
