// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::session::OutboundSession;
use crate::core::RelayError;
use crate::core::metrics;
use crate::core::state::{ConnectionId, ServerState};
use axum::extract::ws::{Message, WebSocket};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, broadcast};
use tracing::{debug, info, warn};

/// Manages the full lifecycle of one upgraded WebSocket.
pub struct ConnectionHandler {
    socket: WebSocket,
    addr: SocketAddr,
    state: Arc<ServerState>,
    connection_id: ConnectionId,
    global_shutdown_rx: broadcast::Receiver<()>,
    guard: ConnectionGuard,
}

impl ConnectionHandler {
    /// Assigns the socket a fresh connection id. Nothing is registered until `run`.
    pub fn new(
        socket: WebSocket,
        addr: SocketAddr,
        state: Arc<ServerState>,
        permit: OwnedSemaphorePermit,
        global_shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let connection_id = ConnectionId::generate();
        let guard = ConnectionGuard::new(state.clone(), connection_id.clone(), addr, permit);
        Self {
            socket,
            addr,
            state,
            connection_id,
            global_shutdown_rx,
            guard,
        }
    }

    /// The main event loop for the connection, relaying inbound frames to the
    /// dispatcher and draining the outbound queue into the socket.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let rx = self.state.connect_client(&self.connection_id, self.addr)?;
        self.guard.registered = true;
        let mut session = OutboundSession::new(self.connection_id.clone(), rx);

        let result = self.event_loop(&mut session).await;
        let (lifetime, idle) = self
            .state
            .clients
            .get(&self.connection_id)
            .map(|client| (client.info.created.elapsed(), client.info.last_event_time.elapsed()))
            .unwrap_or_default();
        info!(
            "Connection {} from {} closed after {:.1?} (idle {:.1?}), {} frames in, {} frames out.",
            self.connection_id,
            self.addr,
            lifetime,
            idle,
            session.frames_received,
            session.frames_sent
        );
        // Dropping `self` drops the guard, which runs disconnect cleanup.
        result
    }

    async fn event_loop(&mut self, session: &mut OutboundSession) -> Result<(), RelayError> {
        loop {
            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.global_shutdown_rx.recv() => {
                    info!("Connection handler for {} received GLOBAL shutdown signal.", self.connection_id);
                    let _ = self.socket.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = session.next_frame() => {
                    let Some(text) = frame else {
                        debug!("Outbound queue for {} closed.", self.connection_id);
                        return Ok(());
                    };
                    self.socket.send(Message::Text(text.into())).await?;
                    session.frames_sent += 1;
                }
                message = self.socket.recv() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            session.frames_received += 1;
                            self.process_text(text.as_str());
                        }
                        Some(Ok(Message::Binary(_))) => {
                            metrics::DROPPED_FRAMES_TOTAL.with_label_values(&["binary"]).inc();
                            debug!("Ignoring binary frame from {}.", self.connection_id);
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Connection {} closed by peer.", self.connection_id);
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            warn!("Connection error for {}: {}", self.connection_id, e);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn process_text(&self, text: &str) {
        debug!("{}: received frame: {}", self.connection_id, text);
        self.state.handle_frame(&self.connection_id, text);
        if let Some(mut client) = self.state.clients.get_mut(&self.connection_id) {
            client.info.last_event_time = Instant::now();
        }
    }
}
