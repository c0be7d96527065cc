use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use redline_server::{
    api::{cors_layer, router, AppState},
    auth::jwt::SessionTokenService,
    config::ServerConfig,
    oracle::{HttpOracle, OracleClient, StubOracle},
    store::db::Db,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .init();

    if config.is_dev_session_secret() {
        warn!("using development session secret; set REDLINE_SESSION_SECRET in production");
    }

    let db = Db::open(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path))?;

    let oracle = match &config.oracle_api_key {
        Some(api_key) => {
            info!(model = %config.oracle_model, "oracle backend: http");
            OracleClient::Http(HttpOracle::new(
                &config.oracle_base_url,
                api_key,
                &config.oracle_model,
                config.oracle_timeout,
            )?)
        }
        None => {
            warn!("no oracle API key configured; using deterministic stub backend");
            OracleClient::Stub(StubOracle)
        }
    };

    let tokens = SessionTokenService::new(&config.session_secret)
        .context("failed to initialize session token service")?;

    let state = AppState {
        db: Arc::new(db),
        oracle: Arc::new(oracle),
        tokens: Arc::new(tokens),
    };

    let app = router(state).layer(cors_layer(config.cors_origins.as_deref()));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "redline server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to install ctrl-c handler");
        return;
    }
    info!("shutdown signal received");
}
