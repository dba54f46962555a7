// src/core/protocol/mod.rs

//! The JSON event protocol spoken over each WebSocket.
//!
//! Every text frame is an object `{"event": <name>, "data": <payload>}`; `data`
//! is absent for events without a payload. Event names are the wire contract
//! shared with existing clients and must not change.

pub mod inbound;
pub mod outbound;
pub use inbound::{AnswerCallPayload, CallUserPayload, InboundEvent};
pub use outbound::{OutboundEvent, WireValue};
