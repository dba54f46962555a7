// src/core/mod.rs

//! The pairing and relay engine: connection state, matchmaking, session relay,
//! and the dispatcher that applies client events to them.

pub mod errors;
pub mod handler;
pub mod matchmaker;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod state;

pub use errors::RelayError;
pub use handler::Dispatcher;
