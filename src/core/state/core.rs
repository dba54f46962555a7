// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared relay-wide state.

use super::client::{ClientHandle, ClientInfo, ClientMap, OutboundSender};
use super::connection::ConnectionId;
use super::registry::PresenceSnapshot;
use crate::config::{Config, IceServers};
use crate::core::RelayError;
use crate::core::handler::{Dispatcher, Outbox, Target};
use crate::core::metrics;
use crate::core::protocol::{InboundEvent, OutboundEvent};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

/// The central struct holding all shared, relay-wide state.
/// This struct is wrapped in an `Arc` and passed to every connection handler
/// and HTTP route.
#[derive(Debug)]
pub struct ServerState {
    /// The relay's configuration. Fixed for the lifetime of the process.
    pub config: Arc<Config>,
    /// Every upgraded socket, keyed by its connection id.
    pub clients: ClientMap,
    /// The pairing and relay engine.
    pub dispatcher: Dispatcher,
    /// One permit per live socket, sized by `max_clients`.
    pub connection_permits: Arc<Semaphore>,
    /// The ICE configuration served to clients, resolved once at startup.
    pub ice_servers: IceServers,
}

impl ServerState {
    /// Initializes the relay state from the given configuration.
    pub fn initialize(config: Config) -> Arc<Self> {
        let ice_servers = config.ice.ice_servers();
        info!(
            "Advertising {} ICE server entr{} to clients.",
            ice_servers.ice_servers.len(),
            if ice_servers.ice_servers.len() == 1 { "y" } else { "ies" }
        );
        Arc::new(Self {
            clients: Arc::new(DashMap::new()),
            dispatcher: Dispatcher::new(config.signaling.clone()),
            connection_permits: Arc::new(Semaphore::new(config.max_clients)),
            ice_servers,
            config: Arc::new(config),
        })
    }

    /// Adds a socket to the client map and returns the receiving half of its
    /// outbound queue. The socket is not yet known to the dispatcher.
    pub fn attach_client(
        &self,
        id: &ConnectionId,
        addr: SocketAddr,
    ) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_capacity);
        self.clients.insert(
            id.clone(),
            ClientHandle {
                info: ClientInfo::new(addr, id.clone()),
                outbound: tx,
            },
        );
        rx
    }

    /// Registers `id` with the dispatcher and attaches its outbound queue in the
    /// same step, so the first event the socket sees is its `connected` frame.
    ///
    /// A refused id leaves the client map untouched.
    pub fn connect_client(
        &self,
        id: &ConnectionId,
        addr: SocketAddr,
    ) -> Result<mpsc::Receiver<OutboundEvent>, RelayError> {
        let mut attached = None;
        self.dispatcher.connect_with(id, |outbox| {
            attached = Some(self.attach_client(id, addr));
            self.deliver(outbox);
        })?;
        attached.ok_or_else(|| RelayError::Internal(format!("no outbound queue attached for {id}")))
    }

    /// Detaches `id`'s outbound queue and runs disconnect cleanup, notifying
    /// former partners.
    pub fn disconnect_client(&self, id: &ConnectionId) {
        if self.clients.remove(id).is_none() {
            debug!("Client {} was not in the client map upon cleanup.", id);
        }
        self.dispatcher.disconnect_with(id, |outbox| self.deliver(outbox));
    }

    /// Decodes and applies one text frame from `from`. Notifications are
    /// enqueued before any other operation can change the registry.
    pub fn handle_frame(&self, from: &ConnectionId, text: &str) {
        self.dispatcher
            .handle_frame_with(from, text, |outbox| self.deliver(outbox));
    }

    /// Applies one already-decoded event from `from`.
    pub fn dispatch(&self, from: &ConnectionId, event: InboundEvent) {
        self.dispatcher
            .dispatch_with(from, event, |outbox| self.deliver(outbox));
    }

    /// Hands every delivery in `outbox` to the matching outbound queues.
    ///
    /// Delivery never blocks, so it is safe to call while the dispatcher holds
    /// its lock. Events for connections that are already gone are discarded,
    /// and a full queue drops the event.
    pub fn deliver(&self, outbox: Outbox) {
        for delivery in outbox {
            match delivery.target {
                Target::Connection(id) => match self.clients.get(&id) {
                    Some(client) => push(&id, &client.outbound, delivery.event),
                    None => debug!(
                        "Discarding {} for {}: connection is gone.",
                        delivery.event.name(),
                        id
                    ),
                },
                Target::Everyone => {
                    for client in self.clients.iter() {
                        push(client.key(), &client.outbound, delivery.event.clone());
                    }
                }
            }
        }
    }

    /// Current pool and pair counts. Also refreshes the presence gauges.
    pub fn presence(&self) -> PresenceSnapshot {
        let snapshot = self.dispatcher.snapshot();
        metrics::record_presence(&snapshot);
        snapshot
    }
}

fn push(id: &ConnectionId, outbound: &OutboundSender, event: OutboundEvent) {
    let name = event.name();
    match outbound.try_send(event) {
        Ok(()) => {
            metrics::RELAYED_EVENTS_TOTAL.with_label_values(&[name]).inc();
        }
        Err(TrySendError::Full(_)) => {
            metrics::OUTBOUND_DROPPED_TOTAL.inc();
            warn!("Outbound queue for {} is full; dropping {}.", id, name);
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Outbound queue for {} is closed; dropping {}.", id, name);
        }
    }
}
