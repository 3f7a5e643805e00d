//! Arena Server - authoritative server for a real-time multiplayer arena
//!
//! This is the main entry point. It handles:
//! - WebSocket connections carrying movement, action and shoot commands
//! - Hitscan combat resolved against one shared player registry
//! - Periodic cleanup of players that stopped sending updates
//! - Health and root HTTP endpoints

mod app;
mod config;
mod game;
mod http;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!(addr = %config.server_addr, "Starting Arena Server");

    // Create application state
    let state = AppState::new(config.clone());
    info!(
        backend = state.geometry.backend_name(),
        accelerated = state.geometry.is_accelerated(),
        "Geometry backend ready"
    );

    // Spawn cleanup sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(state.sweeper().run(shutdown_rx));

    let router = build_router(state);
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!(
        addr = %addr,
        health = %format!("http://{addr}/health"),
        websocket = %format!("ws://{addr}/ws"),
        "Server listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the sweeper before the registry is dropped
    let _ = shutdown_tx.send(true);
    sweeper.await?;

    info!(addr = %addr, "Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
