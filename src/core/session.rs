// src/core/session.rs

//! Relays payloads between the members of a session pair.
//!
//! Payloads are never inspected. Every relay is fire-and-forget: an event from
//! an unpaired connection, or addressed to a connection that no longer exists,
//! is dropped without telling the sender.

use crate::config::SignalingConfig;
use crate::core::RelayError;
use crate::core::handler::Outbox;
use crate::core::matchmaker::departure_notice;
use crate::core::protocol::{AnswerCallPayload, CallUserPayload, OutboundEvent, WireValue};
use crate::core::state::{ConnectionId, Modality, Registry};
use serde_json::value::RawValue;
use tracing::{debug, info, warn};

pub struct SessionRelay<'a> {
    registry: &'a mut Registry,
    settings: &'a SignalingConfig,
}

impl<'a> SessionRelay<'a> {
    pub fn new(registry: &'a mut Registry, settings: &'a SignalingConfig) -> Self {
        Self { registry, settings }
    }

    /// Forwards `event` to `from`'s partner in `modality`.
    /// Returns the partner if the event was queued for delivery.
    pub fn relay_to_partner(
        &self,
        from: &ConnectionId,
        modality: Modality,
        event: OutboundEvent,
        outbox: &mut Outbox,
    ) -> Option<ConnectionId> {
        match self.registry.partner(from, modality) {
            Some(partner) => {
                debug!("Relaying {} from {} to {}.", event.name(), from, partner);
                outbox.send(&partner, event);
                Some(partner)
            }
            None => {
                debug!(
                    "Dropping {} from {}: no active {} pair.",
                    event.name(),
                    from,
                    modality
                );
                None
            }
        }
    }

    /// Relays a chat message to the text partner, untouched.
    pub fn send_message(
        &self,
        from: &ConnectionId,
        message: Box<RawValue>,
        outbox: &mut Outbox,
    ) -> Option<ConnectionId> {
        self.relay_to_partner(from, Modality::Text, OutboundEvent::ReceiveMessage(message), outbox)
    }

    pub fn typing(&self, from: &ConnectionId, outbox: &mut Outbox) -> Option<ConnectionId> {
        self.relay_to_partner(from, Modality::Text, OutboundEvent::Typing, outbox)
    }

    /// Delivers a signaling offer to the target the caller named.
    pub fn call_user(
        &self,
        from: &ConnectionId,
        payload: CallUserPayload,
        outbox: &mut Outbox,
    ) -> Option<ConnectionId> {
        let target = payload.user_to_call;
        info!("{} is calling {}.", from, target);
        let name = match payload.name {
            Some(name) => WireValue::Raw(name),
            None => WireValue::text(self.settings.caller_display_name.as_str()),
        };
        let event = OutboundEvent::CallUser {
            from: payload.from.into(),
            signal: payload.signal_data.into(),
            name,
        };
        self.signal_target(from, target, event, outbox)
    }

    /// Delivers a signaling answer back to the caller named in `to`.
    pub fn answer_call(
        &self,
        from: &ConnectionId,
        payload: AnswerCallPayload,
        outbox: &mut Outbox,
    ) -> Option<ConnectionId> {
        info!("{} answered a call from {}.", from, payload.to);
        let event = OutboundEvent::CallAccepted(payload.signal.into());
        self.signal_target(from, payload.to, event, outbox)
    }

    /// Ends `from`'s video call. Returns the partner that was notified.
    pub fn end_call(
        &mut self,
        from: &ConnectionId,
        outbox: &mut Outbox,
    ) -> Result<Option<ConnectionId>, RelayError> {
        if !self.settings.end_call_dissolves_pair {
            info!("{} ended the call.", from);
            return Ok(None);
        }
        let partner = self.registry.dissolve(from, Modality::Video)?;
        match &partner {
            Some(partner) => {
                info!("{} ended the call with {}.", from, partner);
                outbox.send(partner, departure_notice(Modality::Video));
            }
            None => debug!("{} ended a call but had no video partner.", from),
        }
        Ok(partner)
    }

    /// Routes a signaling event by a client-supplied target id.
    fn signal_target(
        &self,
        from: &ConnectionId,
        target: ConnectionId,
        event: OutboundEvent,
        outbox: &mut Outbox,
    ) -> Option<ConnectionId> {
        if !self.registry.contains(&target) {
            debug!(
                "Dropping {} from {}: target {} is not connected.",
                event.name(),
                from,
                target
            );
            return None;
        }
        if self.settings.enforce_partner_routing
            && self.registry.partner(from, Modality::Video).as_ref() != Some(&target)
        {
            warn!(
                "Dropping {} from {}: {} is not its video partner.",
                event.name(),
                from,
                target
            );
            return None;
        }
        outbox.send(&target, event);
        Some(target)
    }
}
