// src/core/handler/outbox.rs

//! The set of outbound events produced by one engine operation.

use crate::core::protocol::OutboundEvent;
use crate::core::state::ConnectionId;

/// Who an outbound event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Connection(ConnectionId),
    /// Every live connection.
    Everyone,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: Target,
    pub event: OutboundEvent,
}

/// Collects deliveries while the registry lock is held so that they can be
/// handed to the transport after it is released.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn send(&mut self, to: &ConnectionId, event: OutboundEvent) {
        self.deliveries.push(Delivery {
            target: Target::Connection(to.clone()),
            event,
        });
    }

    pub fn broadcast(&mut self, event: OutboundEvent) {
        self.deliveries.push(Delivery {
            target: Target::Everyone,
            event,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter()
    }

    /// Events addressed directly to `id`, in emission order.
    pub fn events_for<'a>(&'a self, id: &'a ConnectionId) -> impl Iterator<Item = &'a OutboundEvent> {
        self.deliveries.iter().filter_map(move |delivery| match &delivery.target {
            Target::Connection(target) if target == id => Some(&delivery.event),
            _ => None,
        })
    }

    pub fn into_deliveries(self) -> Vec<Delivery> {
        self.deliveries
    }
}

impl IntoIterator for Outbox {
    type Item = Delivery;
    type IntoIter = std::vec::IntoIter<Delivery>;

    fn into_iter(self) -> Self::IntoIter {
        self.deliveries.into_iter()
    }
}
