// src/core/state/stats.rs

//! Contains state definitions and logic for relay statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Holds relay-wide counters used for presence reporting and monitoring.
///
/// The online counter is advisory: it feeds `updateUserCount` broadcasts and
/// plays no part in pairing correctness.
#[derive(Debug)]
pub struct StatsState {
    /// The number of connections currently online.
    online: AtomicUsize,
    /// The total number of connections accepted since startup.
    total_connections: AtomicU64,
    /// The total number of inbound events processed since startup.
    total_events: AtomicU64,
    /// The total number of pairs formed since startup.
    total_matches: AtomicU64,
}

impl Default for StatsState {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsState {
    pub fn new() -> Self {
        Self {
            online: AtomicUsize::new(0),
            total_connections: AtomicU64::new(0),
            total_events: AtomicU64::new(0),
            total_matches: AtomicU64::new(0),
        }
    }

    /// Records a new connection and returns the updated online count.
    pub fn connection_opened(&self) -> usize {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.online.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records a closed connection and returns the updated online count.
    /// The counter never drops below zero.
    pub fn connection_closed(&self) -> usize {
        let previous = self
            .online
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn online(&self) -> usize {
        self.online.load(Ordering::Relaxed)
    }

    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn increment_total_events(&self) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub fn increment_total_matches(&self) {
        self.total_matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_matches(&self) -> u64 {
        self.total_matches.load(Ordering::Relaxed)
    }
}
