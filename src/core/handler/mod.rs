// src/core/handler/mod.rs

//! Turns inbound client events into state transitions and outbound deliveries.

pub mod dispatcher;
pub mod outbox;

pub use dispatcher::Dispatcher;
pub use outbox::{Delivery, Outbox, Target};
