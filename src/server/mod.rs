// src/server/mod.rs

use anyhow::Result;

use crate::config::Config;
use crate::core::state::LogReloadHandle;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

/// The main broker startup function, orchestrating all setup phases.
pub async fn run(config: Config, log_reload_handle: LogReloadHandle) -> Result<()> {
    let mut server_context = initialization::setup(config, log_reload_handle).await?;
    spawner::spawn_all(&mut server_context).await?;
    connection_loop::run(server_context).await;
    Ok(())
}
