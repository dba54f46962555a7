// src/core/matchmaker.rs

//! Pairs connections waiting in the same modality.

use crate::config::SignalingConfig;
use crate::core::RelayError;
use crate::core::handler::Outbox;
use crate::core::protocol::{OutboundEvent, WireValue};
use crate::core::state::{ConnectionId, Modality, Registry};
use tracing::{debug, info};

/// The event a connection receives when its partner leaves a pair.
pub fn departure_notice(modality: Modality) -> OutboundEvent {
    match modality {
        Modality::Video => OutboundEvent::CallEnded,
        Modality::Text => OutboundEvent::ChatDisconnected,
    }
}

/// Operates on the registry's waiting pools for the duration of one request.
pub struct Matchmaker<'a> {
    registry: &'a mut Registry,
    settings: &'a SignalingConfig,
}

impl<'a> Matchmaker<'a> {
    pub fn new(registry: &'a mut Registry, settings: &'a SignalingConfig) -> Self {
        Self { registry, settings }
    }

    /// Queues `id` for a partner in `modality` and pairs it if anyone else is waiting.
    ///
    /// An existing pair in the same modality is dissolved first; the old partner
    /// is told and goes back to `Idle` without being queued again. Returns the
    /// new partner, or `None` if `id` is left waiting.
    pub fn request_match(
        &mut self,
        id: &ConnectionId,
        modality: Modality,
        outbox: &mut Outbox,
    ) -> Result<Option<ConnectionId>, RelayError> {
        if let Some(old_partner) = self.registry.dissolve(id, modality)? {
            info!(
                "{} left its {} pair with {} to find a new partner.",
                id, modality, old_partner
            );
            outbox.send(&old_partner, departure_notice(modality));
        }

        if let Some(previous) = self.registry.leave_pool(id)?
            && previous != modality
        {
            debug!("{} stopped waiting for {} to wait for {}.", id, previous, modality);
        }
        self.registry.enqueue(id, modality)?;

        let Some(partner) = self.registry.pick_partner(modality, id) else {
            debug!("{} is waiting for a {} partner.", id, modality);
            return Ok(None);
        };

        self.registry.pair(id, &partner, modality)?;
        info!("Matched {} with {} for {} chat.", id, partner, modality);
        self.announce(id, &partner, modality, outbox);
        Ok(Some(partner))
    }

    /// Tells both members of a new pair that they were matched.
    ///
    /// Video is asymmetric: the requester is the callee and learns who will call
    /// it, while the waiting partner is told to place the call. Text is symmetric.
    fn announce(
        &self,
        requester: &ConnectionId,
        partner: &ConnectionId,
        modality: Modality,
        outbox: &mut Outbox,
    ) {
        match modality {
            Modality::Video => {
                outbox.send(
                    requester,
                    OutboundEvent::CallUser {
                        from: WireValue::text(partner.as_str()),
                        signal: WireValue::Null,
                        name: WireValue::text(self.settings.caller_display_name.as_str()),
                    },
                );
                outbox.send(
                    partner,
                    OutboundEvent::PartnerFound {
                        partner_id: requester.clone(),
                    },
                );
            }
            Modality::Text => {
                outbox.send(requester, OutboundEvent::ChatConnected);
                outbox.send(partner, OutboundEvent::ChatConnected);
            }
        }
    }
}
