// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use crate::core::state::{ConnectionId, ServerState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// An RAII guard to ensure connection resources are always cleaned up when a
/// connection handler's scope is exited, whatever the exit path.
pub struct ConnectionGuard {
    /// A shared reference to the relay state.
    pub(crate) state: Arc<ServerState>,
    /// The connection id assigned at upgrade.
    pub(crate) connection_id: ConnectionId,
    /// The network address of the client.
    pub(crate) addr: SocketAddr,
    /// Set once the dispatcher has accepted the connection. Engine cleanup
    /// only runs for registered connections.
    pub(crate) registered: bool,
    /// Returned to the pool when the guard drops.
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    pub(crate) fn new(
        state: Arc<ServerState>,
        connection_id: ConnectionId,
        addr: SocketAddr,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            state,
            connection_id,
            addr,
            registered: false,
            _permit: permit,
        }
    }
}

impl Drop for ConnectionGuard {
    /// Detaches the socket's outbound queue, runs disconnect cleanup in the
    /// engine, and delivers the resulting notices to former partners.
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, cleaning up resources for {} ({})",
            self.connection_id, self.addr
        );

        if self.registered {
            self.state.disconnect_client(&self.connection_id);
        }
    }
}
