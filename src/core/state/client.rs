// src/core/state/client.rs

//! Contains state definitions related to client connections.

use super::connection::ConnectionId;
use crate::core::protocol::OutboundEvent;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

pub type OutboundSender = mpsc::Sender<OutboundEvent>;
pub type ClientMap = Arc<DashMap<ConnectionId, ClientHandle>>;

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub addr: SocketAddr,
    pub connection_id: ConnectionId,
    pub created: Instant,
    pub last_event_time: Instant,
}

impl ClientInfo {
    pub fn new(addr: SocketAddr, connection_id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            addr,
            connection_id,
            created: now,
            last_event_time: now,
        }
    }
}

/// The gateway's view of a live socket: its metadata and the sending half of
/// its bounded outbound queue.
#[derive(Debug)]
pub struct ClientHandle {
    pub info: ClientInfo,
    pub outbound: OutboundSender,
}
