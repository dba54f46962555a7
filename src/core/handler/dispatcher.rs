// src/core/handler/dispatcher.rs

//! The relay dispatcher: the one entry point through which connection events
//! mutate engine state.
//!
//! Each logical operation (connect, disconnect, one inbound event) runs to
//! completion under a single lock over the registry, so concurrent connections
//! never observe a half-applied transition. The `*_with` variants hand the
//! operation's `Outbox` to a delivery callback before the lock is released:
//! notifications are enqueued in the same order as the state changes that
//! produced them. The callback must not block and must not re-enter the
//! dispatcher. The lock is never held across an `.await`.

use super::outbox::Outbox;
use crate::config::SignalingConfig;
use crate::core::RelayError;
use crate::core::matchmaker::{Matchmaker, departure_notice};
use crate::core::metrics;
use crate::core::protocol::{InboundEvent, OutboundEvent};
use crate::core::session::SessionRelay;
use crate::core::state::{ConnectionId, Modality, PresenceSnapshot, Registry, SlotState, StatsState};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct Dispatcher {
    registry: Mutex<Registry>,
    stats: StatsState,
    settings: SignalingConfig,
}

impl Dispatcher {
    pub fn new(settings: SignalingConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            stats: StatsState::new(),
            settings,
        }
    }

    /// Registers a new connection as `Idle`.
    ///
    /// The new connection is told its id and everyone receives the updated
    /// online count. A duplicate id is refused, changes nothing and delivers
    /// nothing.
    pub fn connect_with(
        &self,
        id: &ConnectionId,
        deliver: impl FnOnce(Outbox),
    ) -> Result<(), RelayError> {
        let mut registry = self.registry.lock();
        if let Err(e) = registry.register(id.clone()) {
            metrics::INVARIANT_VIOLATIONS_TOTAL.inc();
            error!("Refusing to register connection: {}", e);
            return Err(e);
        }
        let online = self.stats.connection_opened();
        self.audit(&registry);

        info!("Client connected: {} ({} online).", id, online);
        let mut outbox = Outbox::new();
        outbox.send(id, OutboundEvent::Connected { id: id.clone() });
        outbox.broadcast(OutboundEvent::UpdateUserCount(online));
        deliver(outbox);
        drop(registry);
        Ok(())
    }

    /// Tears a connection down: leaves its pool, dissolves its pairs, and
    /// unregisters it, all in one step.
    ///
    /// Each former partner is told its partner left. Calling this again for
    /// the same id is a no-op and delivers nothing.
    pub fn disconnect_with(&self, id: &ConnectionId, deliver: impl FnOnce(Outbox)) {
        let mut registry = self.registry.lock();
        let departure = match registry.unregister(id) {
            Ok(departure) => departure,
            Err(_) => {
                debug!("Connection {} was already cleaned up.", id);
                return;
            }
        };
        let online = self.stats.connection_closed();
        self.audit(&registry);

        info!(
            "Client disconnected: {} after {:.1?} ({} online).",
            id,
            departure.prior.connected_at.elapsed(),
            online
        );
        let mut outbox = Outbox::new();
        for (modality, partner) in &departure.released {
            info!("{} lost its {} partner {}.", partner, modality, id);
            outbox.send(partner, departure_notice(*modality));
        }
        outbox.broadcast(OutboundEvent::UpdateUserCount(online));
        deliver(outbox);
        drop(registry);
    }

    /// Decodes and dispatches one text frame. Malformed frames are dropped.
    pub fn handle_frame_with(&self, from: &ConnectionId, text: &str, deliver: impl FnOnce(Outbox)) {
        match InboundEvent::parse(text) {
            Ok(event) => self.dispatch_with(from, event, deliver),
            Err(e) => {
                metrics::DROPPED_FRAMES_TOTAL
                    .with_label_values(&["protocol"])
                    .inc();
                debug!("Dropping frame from {}: {}", from, e);
            }
        }
    }

    /// Applies one inbound event from `from`.
    pub fn dispatch_with(&self, from: &ConnectionId, event: InboundEvent, deliver: impl FnOnce(Outbox)) {
        let start = Instant::now();
        let name = event.name();
        self.stats.increment_total_events();

        let mut outbox = Outbox::new();
        let mut registry = self.registry.lock();
        if !registry.contains(from) {
            metrics::DROPPED_FRAMES_TOTAL.with_label_values(&["stale"]).inc();
            debug!("Dropping {} from unregistered connection {}.", name, from);
            return;
        }

        let result = match event {
            InboundEvent::FindPartner => self.find(&mut registry, from, Modality::Video, &mut outbox),
            InboundEvent::FindTextChat => self.find(&mut registry, from, Modality::Text, &mut outbox),
            InboundEvent::CallUser(payload) => {
                SessionRelay::new(&mut registry, &self.settings).call_user(from, payload, &mut outbox);
                Ok(())
            }
            InboundEvent::AnswerCall(payload) => {
                SessionRelay::new(&mut registry, &self.settings).answer_call(from, payload, &mut outbox);
                Ok(())
            }
            InboundEvent::EndCall => SessionRelay::new(&mut registry, &self.settings)
                .end_call(from, &mut outbox)
                .map(|_| ()),
            InboundEvent::SendMessage(message) => {
                SessionRelay::new(&mut registry, &self.settings).send_message(from, message, &mut outbox);
                Ok(())
            }
            InboundEvent::Typing => {
                SessionRelay::new(&mut registry, &self.settings).typing(from, &mut outbox);
                Ok(())
            }
        };

        if let Err(e) = result {
            if e.is_engine_fault() {
                metrics::INVARIANT_VIOLATIONS_TOTAL.inc();
                error!("{} from {} was refused: {}", name, from, e);
            } else {
                warn!("{} from {} failed: {}", name, from, e);
            }
        }
        self.audit(&registry);
        if !outbox.is_empty() {
            deliver(outbox);
        }
        drop(registry);

        metrics::EVENTS_PROCESSED_TOTAL
            .with_label_values(&[name])
            .inc();
        metrics::DISPATCH_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
    }

    /// Like [`Dispatcher::connect_with`], but returns the outbox instead of
    /// delivering it. Only for single-threaded callers: deliveries made after
    /// the call returns are no longer ordered against other operations.
    pub fn connect(&self, id: &ConnectionId) -> Result<Outbox, RelayError> {
        let mut collected = Outbox::new();
        self.connect_with(id, |outbox| collected = outbox)?;
        Ok(collected)
    }

    /// Returning counterpart of [`Dispatcher::disconnect_with`].
    pub fn disconnect(&self, id: &ConnectionId) -> Outbox {
        let mut collected = Outbox::new();
        self.disconnect_with(id, |outbox| collected = outbox);
        collected
    }

    /// Returning counterpart of [`Dispatcher::handle_frame_with`].
    pub fn handle_frame(&self, from: &ConnectionId, text: &str) -> Outbox {
        let mut collected = Outbox::new();
        self.handle_frame_with(from, text, |outbox| collected = outbox);
        collected
    }

    /// Returning counterpart of [`Dispatcher::dispatch_with`].
    pub fn dispatch(&self, from: &ConnectionId, event: InboundEvent) -> Outbox {
        let mut collected = Outbox::new();
        self.dispatch_with(from, event, |outbox| collected = outbox);
        collected
    }

    fn find(
        &self,
        registry: &mut Registry,
        id: &ConnectionId,
        modality: Modality,
        outbox: &mut Outbox,
    ) -> Result<(), RelayError> {
        info!("{} is looking for a {} partner.", id, modality);
        let matched = Matchmaker::new(registry, &self.settings).request_match(id, modality, outbox)?;
        if matched.is_some() {
            self.stats.increment_total_matches();
            metrics::MATCHES_TOTAL
                .with_label_values(&[modality.as_ref()])
                .inc();
        }
        Ok(())
    }

    /// In debug builds, checks the registry after every operation.
    fn audit(&self, registry: &Registry) {
        if cfg!(debug_assertions)
            && let Err(e) = registry.verify()
        {
            metrics::INVARIANT_VIOLATIONS_TOTAL.inc();
            error!("Registry invariant broken: {}", e);
        }
    }

    pub fn state_of(&self, id: &ConnectionId, modality: Modality) -> Result<SlotState, RelayError> {
        self.registry.lock().get_state(id, modality)
    }

    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.registry.lock().contains(id)
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.registry.lock().snapshot()
    }

    pub fn verify(&self) -> Result<(), RelayError> {
        self.registry.lock().verify()
    }

    pub fn stats(&self) -> &StatsState {
        &self.stats
    }

    pub fn settings(&self) -> &SignalingConfig {
        &self.settings
    }
}
