// src/core/state/connection.rs

//! Identity and per-modality state of a single live connection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use strum_macros::{AsRefStr, Display, EnumIter};

/// An opaque connection id, assigned by the gateway and stable for the
/// lifetime of the socket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id for a newly accepted socket.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The chat type. Each modality has its own waiting pool and pairing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Modality {
    Video,
    Text,
}

impl Modality {
    /// Index into per-modality arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Modality::Video => 0,
            Modality::Text => 1,
        }
    }
}

/// Where a connection stands in one modality.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Idle,
    Waiting,
    Paired(ConnectionId),
}

impl SlotState {
    pub fn partner(&self) -> Option<&ConnectionId> {
        match self {
            SlotState::Paired(partner) => Some(partner),
            _ => None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, SlotState::Waiting)
    }
}

/// The registry's record of a live connection.
///
/// Video and text are independent: a connection may be paired in both at once,
/// but it waits in at most one pool.
#[derive(Clone, Debug)]
pub struct ConnectionRecord {
    video: SlotState,
    text: SlotState,
    pub connected_at: Instant,
}

impl Default for ConnectionRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRecord {
    pub fn new() -> Self {
        Self {
            video: SlotState::Idle,
            text: SlotState::Idle,
            connected_at: Instant::now(),
        }
    }

    pub fn slot(&self, modality: Modality) -> &SlotState {
        match modality {
            Modality::Video => &self.video,
            Modality::Text => &self.text,
        }
    }

    pub(crate) fn slot_mut(&mut self, modality: Modality) -> &mut SlotState {
        match modality {
            Modality::Video => &mut self.video,
            Modality::Text => &mut self.text,
        }
    }

    /// The modality this connection is currently queued in, if any.
    pub fn waiting_in(&self) -> Option<Modality> {
        if self.video.is_waiting() {
            Some(Modality::Video)
        } else if self.text.is_waiting() {
            Some(Modality::Text)
        } else {
            None
        }
    }

    pub fn is_idle(&self) -> bool {
        self.video == SlotState::Idle && self.text == SlotState::Idle
    }
}
