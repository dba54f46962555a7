// src/core/state/mod.rs

//! Defines the central `ServerState` struct and all related state components.
//! The registry and its connection records are the engine's own state; the
//! client map and `ServerState` belong to the gateway around it.

mod client;
mod connection;
mod core;
mod registry;
mod stats;

pub use client::*;
pub use connection::{ConnectionId, ConnectionRecord, Modality, SlotState};
pub use core::ServerState;
pub use registry::{Departure, PresenceSnapshot, Registry, WaitingPool};
pub use stats::StatsState;
