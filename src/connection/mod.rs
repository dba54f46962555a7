// src/connection/mod.rs

//! Manages the lifecycle of a single client WebSocket: registration with the
//! engine, the read/write loop, and cleanup on every exit path.

mod guard;
mod handler;
mod session;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use session::OutboundSession;
