// src/connection/agent_session.rs

//! The agent-side endpoint: `ClusterAgentService.AgentClusters`. Reads a
//! stream of advertisements from one connected agent and pushes requests
//! the Matcher/Reaper forward to it.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use super::guard::AgentGuard;
use crate::core::model::ClusterAdvertisement;
use crate::core::protocol::{WireCodec, WireMessage};
use crate::core::registry::AgentHandle;
use crate::core::state::BrokerState;

/// Runs until the agent's stream ends or a global shutdown fires.
///
/// `framed` has already consumed the `Hello::Agent` handshake frame.
pub async fn run<S>(
    mut framed: Framed<S, WireCodec>,
    state: Arc<BrokerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (tx, mut outbound_rx) = mpsc::unbounded_channel();
    let handle = AgentHandle::new(tx);
    state.registry.register_agent(handle.clone());
    let _guard = AgentGuard::new(state.registry.clone(), handle.clone());

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!(agent = handle.id(), "agent session shutting down");
                return;
            }

            maybe_req = outbound_rx.recv() => {
                let Some(req) = maybe_req else {
                    // Channel closed only if the handle itself was dropped,
                    // which doesn't happen while this task owns it.
                    continue;
                };
                if framed.send(WireMessage::Request(req)).await.is_err() {
                    warn!(agent = handle.id(), "failed to forward request, agent likely disconnected");
                    return;
                }
            }

            frame = framed.next() => {
                match frame {
                    Some(Ok(WireMessage::Advertisement(ad))) => {
                        apply(&state, &handle, ad);
                    }
                    Some(Ok(other)) => {
                        debug!(agent = handle.id(), frame = ?other, "ignoring unexpected frame from agent");
                    }
                    Some(Err(e)) => {
                        warn!(agent = handle.id(), error = %e, "agent stream error");
                        return;
                    }
                    None => {
                        debug!(agent = handle.id(), "agent stream closed");
                        return;
                    }
                }
            }
        }
    }
}

fn apply(state: &Arc<BrokerState>, handle: &AgentHandle, ad: ClusterAdvertisement) {
    state.registry.apply_advertisement(handle, ad);
}
