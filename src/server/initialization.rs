// src/server/initialization.rs

//! Binds the listening socket and builds the shared `BrokerState`.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::{BrokerState, LogReloadHandle};

/// Initializes broker state and binds the listening socket before the main
/// loop starts.
pub async fn setup(config: Config, log_reload_handle: LogReloadHandle) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Warden broker listening on {}:{}", config.host, config.port);

    let state = BrokerState::with_log_reload_handle(config, log_reload_handle);

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

fn log_startup_info(config: &Config) {
    info!(
        host = %config.host,
        port = config.port,
        reaper_interval_secs = config.reaper_interval_secs,
        "starting broker"
    );
}
