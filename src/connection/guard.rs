// src/connection/guard.rs

//! RAII guards that make sure a disconnecting agent or client is always
//! cleared out of the Registry.

use std::sync::Arc;

use tracing::debug;

use crate::core::metrics;
use crate::core::registry::{AgentHandle, Registry};

/// Dropped when an agent session's task ends for any reason. Revokes every
/// cluster the agent owned.
pub struct AgentGuard {
    registry: Arc<Registry>,
    handle: AgentHandle,
}

impl AgentGuard {
    pub fn new(registry: Arc<Registry>, handle: AgentHandle) -> Self {
        metrics::CONNECTED_AGENTS.inc();
        Self { registry, handle }
    }
}

impl Drop for AgentGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_AGENTS.dec();
        debug!(agent = self.handle.id(), "agent session ending, revoking its clusters");
        self.registry.deregister_agent(self.handle.id());
        self.registry.revoke_agent(&self.handle);
    }
}

/// Dropped when a streaming client session's task ends. Only deregisters the
/// client from the broadcast set; per spec, a disconnect never revokes
/// reservations the client may have made.
pub struct ClientGuard {
    registry: Arc<Registry>,
    client_id: u64,
}

impl ClientGuard {
    pub fn new(registry: Arc<Registry>, client_id: u64) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            registry,
            client_id,
        }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(client = self.client_id, "client session ending");
        self.registry.deregister_client(self.client_id);
    }
}
