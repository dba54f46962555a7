// src/server/mod.rs

use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Result, anyhow};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod router;
mod spawner;

pub use router::{AppState, UserStats, build_router};

/// The main server startup function, orchestrating all setup phases.
/// Runs until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize relay state and bind the listener.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context);

    // 3. Serve until a termination signal arrives.
    let stop = connection_loop::termination_signal()?;
    connection_loop::run(server_context, stop).await
}

/// A relay running on a background task, stopped with [`ServerHandle::shutdown`].
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    pub state: Arc<ServerState>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    /// Runs the graceful shutdown sequence and waits for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop_tx.send(());
        self.task
            .await
            .map_err(|e| anyhow!("Server task failed: {e}"))?
    }
}

/// Starts the relay on a background task. Binding port 0 picks a free port,
/// reported in `local_addr`.
pub async fn start(config: Config) -> Result<ServerHandle> {
    let mut server_context = initialization::setup(config).await?;
    spawner::spawn_all(&mut server_context);

    let local_addr = server_context.listener.local_addr()?;
    let state = server_context.state.clone();
    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(connection_loop::run(server_context, async move {
        stop_rx.await.ok();
    }));

    Ok(ServerHandle {
        local_addr,
        state,
        stop_tx,
        task,
    })
}
