// src/server/initialization.rs

//! Builds the relay state and binds the listener before the main loop starts.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    let local_addr = listener.local_addr()?;

    let state = ServerState::initialize(config);
    info!("Relay state initialized.");
    info!("Voodo relay listening on {}", local_addr);

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Accepting up to {} clients with {} queued events each.",
        config.max_clients, config.outbound_queue_capacity
    );
    if config.allowed_origins.is_empty() {
        warn!("No allowed_origins configured: CORS is permissive.");
    } else {
        info!("CORS origins: {}", config.allowed_origins.join(", "));
    }
    if config.signaling.enforce_partner_routing {
        info!("Signaling is restricted to recorded video partners.");
    }
    if !config.signaling.end_call_dissolves_pair {
        info!("endCall is logged only and does not dissolve video pairs.");
    }
}
