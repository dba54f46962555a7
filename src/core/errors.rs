// src/core/errors.rs

//! Defines the primary error type for the relay engine.

use crate::core::state::ConnectionId;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures inside the relay.
///
/// Client misbehaviour (`Protocol`) and engine bugs (`DuplicateConnection`,
/// `InvariantViolation`) are kept apart so callers can log them at the right level.
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON Error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("Connection '{0}' is already registered")]
    DuplicateConnection(ConnectionId),

    #[error("Connection '{0}' not found")]
    NotFound(ConnectionId),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns true for errors caused by the engine itself rather than by a client.
    pub fn is_engine_fault(&self) -> bool {
        matches!(
            self,
            RelayError::DuplicateConnection(_) | RelayError::InvariantViolation(_)
        )
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Json(Arc::new(e))
    }
}

impl From<axum::Error> for RelayError {
    fn from(e: axum::Error) -> Self {
        RelayError::Internal(format!("websocket transport: {e}"))
    }
}
