// src/server/spawner.rs

//! Spawns the broker's long-running background tasks: the Reaper and,
//! when enabled, the Prometheus metrics exporter.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use super::context::ServerContext;
use super::metrics_server;
use crate::core::reaper::Reaper;

/// Spawns all background tasks into the provided JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    if state.config.metrics.enabled {
        let metrics_state = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    let reaper = Reaper::new(
        state.registry.clone(),
        Duration::from_secs(state.config.reaper_interval_secs),
    );
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        reaper.run(shutdown_rx).await;
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
