// src/connection/session.rs

//! Per-socket outbound session: drains the connection's queue and encodes
//! each event into a text frame.

use crate::core::protocol::OutboundEvent;
use crate::core::state::ConnectionId;
use tokio::sync::mpsc;
use tracing::error;

/// The receiving half of a connection's outbound queue plus a few counters
/// kept for the closing log line.
pub struct OutboundSession {
    connection_id: ConnectionId,
    rx: mpsc::Receiver<OutboundEvent>,
    pub frames_sent: u64,
    pub frames_received: u64,
}

impl OutboundSession {
    pub fn new(connection_id: ConnectionId, rx: mpsc::Receiver<OutboundEvent>) -> Self {
        Self {
            connection_id,
            rx,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    /// Waits for the next queued event and encodes it.
    ///
    /// Events that fail to encode are logged and skipped. Returns `None` once
    /// the sending half has been dropped.
    pub async fn next_frame(&mut self) -> Option<String> {
        loop {
            let event = self.rx.recv().await?;
            match event.encode() {
                Ok(text) => return Some(text),
                Err(e) => error!(
                    "Failed to encode {} for {}: {}",
                    event.name(),
                    self.connection_id,
                    e
                ),
            }
        }
    }
}
