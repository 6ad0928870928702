// src/server/context.rs

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::core::state::BrokerState;

/// Holds all the initialized state required to run the broker's main loop.
pub struct ServerContext {
    pub state: Arc<BrokerState>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
