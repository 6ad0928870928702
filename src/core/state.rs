// src/core/state.rs

//! `BrokerState`: the handle shared across every session and background
//! task, analogous to the teacher's `ServerState`.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing_subscriber::{filter::EnvFilter, reload};

use crate::config::Config;
use crate::core::registry::Registry;

/// Handle to the live `tracing` filter, so a future admin hook could change
/// the log level without a restart. No RPC exposes it today.
pub type LogReloadHandle = Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>;

pub struct BrokerState {
    pub registry: Arc<Registry>,
    pub config: Config,
    pub log_reload_handle: Option<LogReloadHandle>,
    /// Caps the number of concurrently connected agent sessions at
    /// `config.max_agents`, mirroring the teacher's connection-permit
    /// semaphore in `server::initialization`.
    pub agent_permits: Arc<Semaphore>,
    /// Caps the number of concurrently connected streaming/unary client
    /// sessions at `config.max_clients`.
    pub client_permits: Arc<Semaphore>,
}

impl BrokerState {
    pub fn new(config: Config) -> Arc<Self> {
        let agent_permits = Arc::new(Semaphore::new(config.max_agents));
        let client_permits = Arc::new(Semaphore::new(config.max_clients));
        Arc::new(Self {
            registry: Arc::new(Registry::new()),
            config,
            log_reload_handle: None,
            agent_permits,
            client_permits,
        })
    }

    pub fn with_log_reload_handle(config: Config, handle: LogReloadHandle) -> Arc<Self> {
        let agent_permits = Arc::new(Semaphore::new(config.max_agents));
        let client_permits = Arc::new(Semaphore::new(config.max_clients));
        Arc::new(Self {
            registry: Arc::new(Registry::new()),
            config,
            log_reload_handle: Some(handle),
            agent_permits,
            client_permits,
        })
    }
}
