// src/core/state/registry.rs

//! The connection registry: the single source of truth for which connections
//! are live, which are queued, and which are paired.
//!
//! Every mutation validates its preconditions before touching any table, so a
//! failed call leaves the registry exactly as it found it. The registry is not
//! synchronized on its own; the dispatcher owns it behind one lock so that each
//! logical operation is applied as a unit.

use super::connection::{ConnectionId, ConnectionRecord, Modality, SlotState};
use crate::core::RelayError;
use crate::core::metrics;
use indexmap::IndexSet;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tracing::error;

/// The set of connections seeking a partner in one modality.
///
/// Iteration order is insertion order, but callers must not rely on it for
/// fairness: any member other than the requester is a valid partner.
#[derive(Debug, Default)]
pub struct WaitingPool {
    members: IndexSet<ConnectionId>,
}

impl WaitingPool {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains(id)
    }

    /// Returns the first member that is not `id`.
    pub fn first_other(&self, id: &ConnectionId) -> Option<&ConnectionId> {
        self.members.iter().find(|member| *member != id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter()
    }

    fn insert(&mut self, id: ConnectionId) -> bool {
        self.members.insert(id)
    }

    fn remove(&mut self, id: &ConnectionId) -> bool {
        self.members.shift_remove(id)
    }
}

/// What was left behind when a connection was unregistered.
#[derive(Debug)]
pub struct Departure {
    /// The connection's record as it was just before removal.
    pub prior: ConnectionRecord,
    /// Former partners that were returned to `Idle`, one per dissolved pair.
    pub released: Vec<(Modality, ConnectionId)>,
}

/// Point-in-time counts used for presence reporting and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub registered: usize,
    pub waiting_video: usize,
    pub waiting_text: usize,
    pub active_video_pairs: usize,
    pub active_text_pairs: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, ConnectionRecord>,
    pools: [WaitingPool; 2],
    pair_counts: [usize; 2],
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a new `Idle` connection.
    pub fn register(&mut self, id: ConnectionId) -> Result<(), RelayError> {
        if self.connections.contains_key(&id) {
            return Err(RelayError::DuplicateConnection(id));
        }
        self.connections.insert(id, ConnectionRecord::new());
        Ok(())
    }

    /// Removes a connection along with its pool membership and pairs.
    ///
    /// Partners of dissolved pairs are returned to `Idle` and listed in the
    /// returned `Departure` so the caller can notify them. A second call for
    /// the same id fails with `NotFound` and changes nothing.
    pub fn unregister(&mut self, id: &ConnectionId) -> Result<Departure, RelayError> {
        let prior = self
            .connections
            .remove(id)
            .ok_or_else(|| RelayError::NotFound(id.clone()))?;

        let mut released = Vec::new();
        for modality in Modality::iter() {
            match prior.slot(modality) {
                SlotState::Idle => {}
                SlotState::Waiting => {
                    self.pools[modality.index()].remove(id);
                }
                SlotState::Paired(partner) => {
                    self.pair_counts[modality.index()] =
                        self.pair_counts[modality.index()].saturating_sub(1);
                    if self.release_partner(partner, id, modality) {
                        released.push((modality, partner.clone()));
                    }
                }
            }
        }
        Ok(Departure { prior, released })
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionRecord> {
        self.connections.get(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get_state(&self, id: &ConnectionId, modality: Modality) -> Result<SlotState, RelayError> {
        self.connections
            .get(id)
            .map(|record| record.slot(modality).clone())
            .ok_or_else(|| RelayError::NotFound(id.clone()))
    }

    /// Replaces the state of one slot and returns the previous state.
    ///
    /// Pool membership follows the slot: entering `Waiting` joins the pool,
    /// leaving it leaves the pool. This is a raw primitive: it does not touch
    /// the partner's slot, so pairing must go through `pair`/`dissolve`.
    pub fn set_state(
        &mut self,
        id: &ConnectionId,
        modality: Modality,
        state: SlotState,
    ) -> Result<SlotState, RelayError> {
        let record = self
            .connections
            .get_mut(id)
            .ok_or_else(|| RelayError::NotFound(id.clone()))?;
        if state.is_waiting()
            && let Some(other) = record.waiting_in()
            && other != modality
        {
            return Err(RelayError::InvariantViolation(format!(
                "connection '{id}' is already waiting for {other}"
            )));
        }

        let previous = std::mem::replace(record.slot_mut(modality), state);
        let pool = &mut self.pools[modality.index()];
        match (previous.is_waiting(), record.slot(modality).is_waiting()) {
            (false, true) => {
                pool.insert(id.clone());
            }
            (true, false) => {
                pool.remove(id);
            }
            _ => {}
        }
        Ok(previous)
    }

    /// Queues a connection in a modality's waiting pool.
    pub fn enqueue(&mut self, id: &ConnectionId, modality: Modality) -> Result<(), RelayError> {
        match self.get_state(id, modality)? {
            SlotState::Paired(partner) => Err(RelayError::InvariantViolation(format!(
                "cannot queue '{id}' for {modality}: still paired with '{partner}'"
            ))),
            SlotState::Waiting => Ok(()),
            SlotState::Idle => self.set_state(id, modality, SlotState::Waiting).map(|_| ()),
        }
    }

    /// Takes a connection out of whichever pool it occupies.
    ///
    /// Returns the modality it was waiting in, or `None` if it was not queued.
    pub fn leave_pool(&mut self, id: &ConnectionId) -> Result<Option<Modality>, RelayError> {
        let record = self
            .connections
            .get(id)
            .ok_or_else(|| RelayError::NotFound(id.clone()))?;
        match record.waiting_in() {
            Some(modality) => {
                self.set_state(id, modality, SlotState::Idle)?;
                Ok(Some(modality))
            }
            None => Ok(None),
        }
    }

    pub fn pool(&self, modality: Modality) -> &WaitingPool {
        &self.pools[modality.index()]
    }

    /// Picks any queued connection other than `id` as a partner candidate.
    pub fn pick_partner(&self, modality: Modality, id: &ConnectionId) -> Option<ConnectionId> {
        self.pools[modality.index()].first_other(id).cloned()
    }

    /// Pairs two waiting connections, removing both from the pool.
    pub fn pair(
        &mut self,
        a: &ConnectionId,
        b: &ConnectionId,
        modality: Modality,
    ) -> Result<(), RelayError> {
        if a == b {
            return Err(RelayError::InvariantViolation(format!(
                "cannot pair '{a}' with itself"
            )));
        }
        for id in [a, b] {
            let state = self.get_state(id, modality)?;
            if !state.is_waiting() || !self.pools[modality.index()].contains(id) {
                return Err(RelayError::InvariantViolation(format!(
                    "cannot pair '{id}' for {modality}: not waiting (state {state:?})"
                )));
            }
        }

        self.set_state(a, modality, SlotState::Paired(b.clone()))?;
        self.set_state(b, modality, SlotState::Paired(a.clone()))?;
        self.pair_counts[modality.index()] += 1;
        Ok(())
    }

    /// Dissolves `id`'s pair in `modality`, returning both members to `Idle`.
    ///
    /// Returns the former partner, or `None` if `id` was not paired. A one-sided
    /// pair is reported as an invariant violation and only `id`'s stale slot is
    /// cleared.
    pub fn dissolve(
        &mut self,
        id: &ConnectionId,
        modality: Modality,
    ) -> Result<Option<ConnectionId>, RelayError> {
        let partner = match self.get_state(id, modality)? {
            SlotState::Paired(partner) => partner,
            _ => return Ok(None),
        };

        self.set_state(id, modality, SlotState::Idle)?;
        self.pair_counts[modality.index()] = self.pair_counts[modality.index()].saturating_sub(1);
        if self.release_partner(&partner, id, modality) {
            Ok(Some(partner))
        } else {
            Ok(None)
        }
    }

    pub fn partner(&self, id: &ConnectionId, modality: Modality) -> Option<ConnectionId> {
        self.connections
            .get(id)
            .and_then(|record| record.slot(modality).partner().cloned())
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            registered: self.connections.len(),
            waiting_video: self.pools[Modality::Video.index()].len(),
            waiting_text: self.pools[Modality::Text.index()].len(),
            active_video_pairs: self.pair_counts[Modality::Video.index()],
            active_text_pairs: self.pair_counts[Modality::Text.index()],
        }
    }

    /// Checks every structural invariant of the tables.
    ///
    /// Pairing must be symmetric, a connection waits in at most one pool, pool
    /// membership mirrors `Waiting` slots, and pair counters match the slots.
    ///
    /// Pool/pair disjointness is checked per modality. A connection paired for
    /// video may wait for a text partner (and the reverse): the two modalities
    /// are independent sessions, so that combination is accepted here.
    pub fn verify(&self) -> Result<(), RelayError> {
        let mut paired_slots = [0usize; 2];
        for (id, record) in &self.connections {
            let mut waiting = 0;
            for modality in Modality::iter() {
                let in_pool = self.pools[modality.index()].contains(id);
                match record.slot(modality) {
                    SlotState::Idle => {
                        if in_pool {
                            return Err(RelayError::InvariantViolation(format!(
                                "'{id}' is idle in {modality} but queued"
                            )));
                        }
                    }
                    SlotState::Waiting => {
                        waiting += 1;
                        if !in_pool {
                            return Err(RelayError::InvariantViolation(format!(
                                "'{id}' is waiting for {modality} but not queued"
                            )));
                        }
                    }
                    SlotState::Paired(partner) => {
                        paired_slots[modality.index()] += 1;
                        if in_pool {
                            return Err(RelayError::InvariantViolation(format!(
                                "'{id}' is paired in {modality} and queued"
                            )));
                        }
                        let back = self.partner(partner, modality);
                        if back.as_ref() != Some(id) {
                            return Err(RelayError::InvariantViolation(format!(
                                "'{id}' is paired with '{partner}' in {modality}, which points at {back:?}"
                            )));
                        }
                    }
                }
            }
            if waiting > 1 {
                return Err(RelayError::InvariantViolation(format!(
                    "'{id}' is queued in more than one pool"
                )));
            }
        }

        for modality in Modality::iter() {
            if let Some(ghost) = self.pools[modality.index()]
                .iter()
                .find(|id| !self.connections.contains_key(*id))
            {
                return Err(RelayError::InvariantViolation(format!(
                    "'{ghost}' is queued for {modality} but not registered"
                )));
            }
            if paired_slots[modality.index()] != self.pair_counts[modality.index()] * 2 {
                return Err(RelayError::InvariantViolation(format!(
                    "{modality} pair counter is {} but {} slots are paired",
                    self.pair_counts[modality.index()],
                    paired_slots[modality.index()]
                )));
            }
        }
        Ok(())
    }

    /// Returns `partner` to `Idle` if its slot points back at `leaving`.
    fn release_partner(
        &mut self,
        partner: &ConnectionId,
        leaving: &ConnectionId,
        modality: Modality,
    ) -> bool {
        match self.connections.get_mut(partner) {
            Some(record) if record.slot(modality).partner() == Some(leaving) => {
                *record.slot_mut(modality) = SlotState::Idle;
                true
            }
            other => {
                metrics::INVARIANT_VIOLATIONS_TOTAL.inc();
                error!(
                    "'{}' was paired with '{}' for {} but the partner slot is {:?}",
                    leaving,
                    partner,
                    modality,
                    other.map(|record| record.slot(modality).clone())
                );
                false
            }
        }
    }
}
