use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway::{build_router, config::GatewayConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        "Starting gateway for @{} users",
        config.domain_policy.allowed_domain()
    );
    tracing::debug!("{:?}", config);

    let addr = config.bind_addr;
    let state = AppState::from_config(config)?;

    state
        .artifacts
        .ensure_root()
        .await
        .context("Failed to create artifact directory")?;
    tracing::info!(
        "Serving artifact {}",
        state.artifacts.current_path().display()
    );

    let app = build_router(state);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
