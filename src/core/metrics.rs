// src/core/metrics.rs

//! Defines and registers Prometheus metrics for broker monitoring.
//!
//! Uses `lazy_static` so metrics are registered exactly once for the
//! lifetime of the process.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, IntGaugeVec, TextEncoder, register_counter, register_gauge, register_int_gauge_vec};

lazy_static! {
    /// The number of agents currently connected.
    pub static ref CONNECTED_AGENTS: Gauge =
        register_gauge!("warden_connected_agents", "Number of currently connected agents.").unwrap();
    /// The number of clients currently connected (streaming sessions only).
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("warden_connected_clients", "Number of currently connected streaming clients.").unwrap();
    /// Live cluster count, labeled by state.
    pub static ref CLUSTERS_BY_STATE: IntGaugeVec =
        register_int_gauge_vec!("warden_clusters_by_state", "Number of clusters in each state.", &["state"]).unwrap();
    /// Total requests processed, not labeled by outcome (see below for that).
    pub static ref REQUESTS_PROCESSED_TOTAL: Counter =
        register_counter!("warden_requests_processed_total", "Total number of client requests processed.").unwrap();
    /// Total reservations reclaimed by the reaper.
    pub static ref REAPED_RESERVATIONS_TOTAL: Counter =
        register_counter!("warden_reaped_reservations_total", "Total number of reservations reclaimed by the reaper.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
