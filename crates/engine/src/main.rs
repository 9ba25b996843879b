//! Lorekeeper engine - backend API for AI-driven tabletop campaigns.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lorekeeper_engine::config::AppConfig;
use lorekeeper_engine::http;
use lorekeeper_engine::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lorekeeper_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lorekeeper engine");

    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Model: {}", config.ai_model);
    tracing::info!("  Database: {}", config.database_url);

    let host = config.host.clone();
    let port = config.port;

    let state = Arc::new(AppState::new(config).await?);
    tracing::info!("Application state initialized");

    let app = http::router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
