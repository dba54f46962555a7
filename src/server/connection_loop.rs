// src/server/connection_loop.rs

//! Contains the main server loop and graceful shutdown.

use super::context::ServerContext;
use super::router::{AppState, build_router};
use anyhow::{Result, anyhow};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

/// Resolves on the first SIGINT or SIGTERM.
pub fn termination_signal() -> Result<impl Future<Output = ()>> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
    })
}

/// Serves HTTP and WebSocket traffic until `stop` resolves or a background
/// task fails, then shuts everything down.
pub async fn run(mut ctx: ServerContext, stop: impl Future<Output = ()>) -> Result<()> {
    let app = build_router(AppState {
        state: ctx.state.clone(),
        shutdown_tx: ctx.shutdown_tx.clone(),
    });
    let mut server_shutdown_rx = ctx.shutdown_tx.subscribe();
    let listener = ctx.listener;
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            server_shutdown_rx.recv().await.ok();
        })
        .await
    });

    tokio::pin!(stop);
    let mut server_finished = false;
    loop {
        tokio::select! {
            biased;

            _ = &mut stop => break,

            res = &mut server => {
                server_finished = true;
                match res {
                    Ok(Ok(())) => warn!("HTTP server stopped unexpectedly."),
                    Ok(Err(e)) => error!("CRITICAL: HTTP server failed: {}. Shutting down.", e),
                    Err(e) => error!("CRITICAL: HTTP server panicked: {e:?}. Shutting down."),
                }
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        debug!("No tasks were listening for the shutdown signal.");
    }

    let timeout = ctx.state.config.shutdown_timeout;
    if !server_finished {
        match tokio::time::timeout(timeout, server).await {
            Ok(Ok(Ok(()))) => info!("HTTP server stopped accepting connections."),
            Ok(Ok(Err(e))) => error!("HTTP server finished with error: {}", e),
            Ok(Err(e)) => error!("HTTP server task failed: {e:?}"),
            Err(_) => warn!("Timed out waiting for the HTTP server to stop."),
        }
    }

    let state = ctx.state.clone();
    if tokio::time::timeout(timeout, async move {
        while !state.clients.is_empty() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_err()
    {
        warn!(
            "Timed out with {} client connections still open.",
            ctx.state.clients.len()
        );
    } else {
        info!("All client connections closed.");
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(timeout, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
    Ok(())
}
