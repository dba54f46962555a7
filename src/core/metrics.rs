// src/core/metrics.rs

//! Defines and registers Prometheus metrics for relay monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use crate::core::state::PresenceSnapshot;
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
};
use tracing::error;

lazy_static! {
    // --- Relay-wide Gauges ---
    /// The number of WebSocket clients currently connected.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("voodo_connected_clients", "Number of currently connected clients.").unwrap();
    /// Connections waiting for a partner, labeled by modality.
    pub static ref WAITING_CONNECTIONS: GaugeVec =
        register_gauge_vec!("voodo_waiting_connections", "Connections waiting for a partner, by modality.", &["modality"]).unwrap();
    /// Live session pairs, labeled by modality.
    pub static ref ACTIVE_PAIRS: GaugeVec =
        register_gauge_vec!("voodo_active_pairs", "Active session pairs, by modality.", &["modality"]).unwrap();


    // --- Relay-wide Counters ---
    /// The total number of WebSocket upgrades accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("voodo_connections_received_total", "Total number of connections received.").unwrap();
    /// Upgrades refused because `max_clients` was reached.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("voodo_connections_rejected_total", "Total number of upgrades refused at capacity.").unwrap();
    pub static ref EVENTS_PROCESSED_TOTAL: CounterVec =
        register_counter_vec!("voodo_events_processed_total", "Total inbound events processed, by event name.", &["event"]).unwrap();
    /// Outbound events queued for delivery, labeled by event name.
    pub static ref RELAYED_EVENTS_TOTAL: CounterVec =
        register_counter_vec!("voodo_relayed_events_total", "Total outbound events queued for delivery, by event name.", &["event"]).unwrap();
    pub static ref MATCHES_TOTAL: CounterVec =
        register_counter_vec!("voodo_matches_total", "Total pairs formed, by modality.", &["modality"]).unwrap();
    /// Inbound frames that were discarded, labeled by reason.
    pub static ref DROPPED_FRAMES_TOTAL: CounterVec =
        register_counter_vec!("voodo_dropped_frames_total", "Total inbound frames dropped, by reason.", &["reason"]).unwrap();
    /// Outbound events discarded because a client's queue was full.
    pub static ref OUTBOUND_DROPPED_TOTAL: Counter =
        register_counter!("voodo_outbound_dropped_total", "Total outbound events dropped on full client queues.").unwrap();
    pub static ref INVARIANT_VIOLATIONS_TOTAL: Counter =
        register_counter!("voodo_invariant_violations_total", "Total registry invariant violations detected.").unwrap();


    // --- Histograms ---
    /// A histogram of inbound event dispatch latencies.
    pub static ref DISPATCH_LATENCY_SECONDS: Histogram =
        register_histogram!("voodo_dispatch_latency_seconds", "Latency of inbound event dispatch in seconds.").unwrap();
}

/// Copies a presence snapshot into the pool and pair gauges.
pub fn record_presence(snapshot: &PresenceSnapshot) {
    WAITING_CONNECTIONS
        .with_label_values(&["video"])
        .set(snapshot.waiting_video as f64);
    WAITING_CONNECTIONS
        .with_label_values(&["text"])
        .set(snapshot.waiting_text as f64);
    ACTIVE_PAIRS
        .with_label_values(&["video"])
        .set(snapshot.active_video_pairs as f64);
    ACTIVE_PAIRS
        .with_label_values(&["text"])
        .set(snapshot.active_text_pairs as f64);
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_else(|e| {
        error!("Failed to encode metrics: {}", e);
        String::new()
    })
}
