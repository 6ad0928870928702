// src/server/metrics_server.rs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::core::metrics::{self, gather_metrics};
use crate::core::model::ClusterState;
use crate::core::state::BrokerState;

/// Handles HTTP requests to the `/metrics` endpoint, refreshing the
/// cluster-count gauges from the Registry before encoding.
async fn metrics_handler(state: Arc<BrokerState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let mut available = 0i64;
    let mut reserved = 0i64;
    let mut ready = 0i64;
    let mut unavailable = 0i64;
    for ad in &snapshot {
        match ad.state {
            ClusterState::Available => available += 1,
            ClusterState::Reserved => reserved += 1,
            ClusterState::Ready => ready += 1,
            ClusterState::Unavailable => unavailable += 1,
        }
    }
    metrics::CLUSTERS_BY_STATE
        .with_label_values(&["available"])
        .set(available);
    metrics::CLUSTERS_BY_STATE
        .with_label_values(&["reserved"])
        .set(reserved);
    metrics::CLUSTERS_BY_STATE
        .with_label_values(&["ready"])
        .set(ready);
    metrics::CLUSTERS_BY_STATE
        .with_label_values(&["unavailable"])
        .set(unavailable);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Runs a small HTTP server exposing Prometheus metrics on `/metrics`.
pub async fn run_metrics_server(state: Arc<BrokerState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config.metrics.port;
    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on port {}: {}", port, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await
    {
        error!("Metrics server error: {}", e);
    }
}
