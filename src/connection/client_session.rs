// src/connection/client_session.rs

//! The client-side endpoints: the streaming `ServerClusters` RPC plus the
//! unary `Request` and `List` RPCs, all multiplexed over the same framed
//! connection type.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use super::guard::ClientGuard;
use crate::core::matcher;
use crate::core::protocol::{WireCodec, WireMessage};
use crate::core::registry::ClientHandle;
use crate::core::state::BrokerState;

/// `ClusterClientService.ServerClusters`: sends the current inventory
/// snapshot, then streams live updates while accepting inbound requests.
pub async fn run_stream<S>(
    mut framed: Framed<S, WireCodec>,
    state: Arc<BrokerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (tx, mut outbound_rx) = mpsc::unbounded_channel();
    let handle = ClientHandle::new(tx);
    state.registry.register_client(handle.clone());
    let _guard = ClientGuard::new(state.registry.clone(), handle.id());

    for ad in state.registry.snapshot() {
        if framed.send(WireMessage::Advertisement(ad)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!(client = handle.id(), "client stream session shutting down");
                return;
            }

            maybe_ad = outbound_rx.recv() => {
                let Some(ad) = maybe_ad else { continue };
                if framed.send(WireMessage::Advertisement(ad)).await.is_err() {
                    warn!(client = handle.id(), "failed to push update, client likely disconnected");
                    return;
                }
            }

            frame = framed.next() => {
                match frame {
                    Some(Ok(WireMessage::Request(req))) => {
                        // Fire-and-forget per spec 4.3: the outcome is learned
                        // through the normal broadcast, not a unicast reply.
                        if let Err(e) = matcher::process_request(&state.registry, req) {
                            debug!(client = handle.id(), error = %e, "streaming request could not be matched");
                        }
                    }
                    Some(Ok(other)) => {
                        debug!(client = handle.id(), frame = ?other, "ignoring unexpected frame from client");
                    }
                    Some(Err(e)) => {
                        warn!(client = handle.id(), error = %e, "client stream error");
                        return;
                    }
                    None => {
                        debug!(client = handle.id(), "client stream closed");
                        return;
                    }
                }
            }
        }
    }
}

/// `ClusterClientService.Request`: a single RESERVE/EXTEND/RETURN/STATUS,
/// blocking on the resulting waiter and replying with the READY
/// advertisement (or an error frame).
pub async fn run_request<S>(mut framed: Framed<S, WireCodec>, state: Arc<BrokerState>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = match framed.next().await {
        Some(Ok(WireMessage::Request(req))) => req,
        Some(Ok(_)) => {
            let _ = framed
                .send(WireMessage::Error("expected a request frame".to_string()))
                .await;
            return;
        }
        Some(Err(e)) => {
            warn!(error = %e, "malformed single-shot request");
            return;
        }
        None => return,
    };

    let waiter = match matcher::process_request(&state.registry, req) {
        Ok(waiter) => waiter,
        Err(e) => {
            let _ = framed.send(WireMessage::Error(e.to_string())).await;
            return;
        }
    };

    match waiter.await {
        Ok(Some(ad)) => {
            let _ = framed.send(WireMessage::Advertisement(ad)).await;
        }
        Ok(None) | Err(_) => {
            let _ = framed
                .send(WireMessage::Error("unable to process request".to_string()))
                .await;
        }
    }
}

/// `ClusterClientService.List`: one-shot dump of the current snapshot.
pub async fn run_list<S>(mut framed: Framed<S, WireCodec>, state: Arc<BrokerState>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for ad in state.registry.snapshot() {
        if framed.send(WireMessage::Advertisement(ad)).await.is_err() {
            return;
        }
    }
    let _ = framed.send(WireMessage::ListEnd).await;
}
