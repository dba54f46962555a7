// src/server/spawner.rs

//! Spawns the relay's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) {
    // --- Metrics Server ---
    if ctx.state.config.metrics.enabled {
        let metrics_state = ctx.state.clone();
        let shutdown_rx_metrics = ctx.shutdown_tx.subscribe();
        ctx.background_tasks
            .spawn(metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics));
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }
}
