// src/connection/mod.rs

//! Per-connection dispatch: every accepted socket is framed with
//! [`WireCodec`], reads its `Hello` handshake frame, and is routed to the
//! agent or client session handler matching it.

mod agent_session;
mod client_session;
mod guard;

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::core::protocol::{Hello, WireCodec, WireMessage};
use crate::core::state::BrokerState;

/// Reads the handshake frame and dispatches to the matching session loop.
/// Returns once the connection's session has ended.
pub async fn handle_connection<S>(
    socket: S,
    addr: SocketAddr,
    state: Arc<BrokerState>,
    shutdown_rx: broadcast::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, WireCodec::new());

    let hello = match framed.next().await {
        Some(Ok(WireMessage::Hello(hello))) => hello,
        Some(Ok(_)) => {
            warn!(%addr, "first frame was not a Hello handshake, dropping connection");
            return;
        }
        Some(Err(e)) => {
            warn!(%addr, error = %e, "failed to decode handshake frame");
            return;
        }
        None => {
            debug!(%addr, "connection closed before handshake");
            return;
        }
    };

    debug!(%addr, ?hello, "accepted connection");

    match hello {
        Hello::Agent => {
            let Ok(_permit) = state.agent_permits.clone().try_acquire_owned() else {
                warn!(%addr, "rejecting agent connection: max_agents reached");
                return;
            };
            agent_session::run(framed, state, shutdown_rx).await
        }
        Hello::ClientStream => {
            let Ok(_permit) = state.client_permits.clone().try_acquire_owned() else {
                warn!(%addr, "rejecting client connection: max_clients reached");
                let _ = framed
                    .send(WireMessage::Error("broker is at max_clients capacity".to_string()))
                    .await;
                return;
            };
            client_session::run_stream(framed, state, shutdown_rx).await
        }
        Hello::ClientRequest => {
            let Ok(_permit) = state.client_permits.clone().try_acquire_owned() else {
                warn!(%addr, "rejecting client connection: max_clients reached");
                let _ = framed
                    .send(WireMessage::Error("broker is at max_clients capacity".to_string()))
                    .await;
                return;
            };
            client_session::run_request(framed, state).await
        }
        Hello::ClientList => {
            let Ok(_permit) = state.client_permits.clone().try_acquire_owned() else {
                warn!(%addr, "rejecting client connection: max_clients reached");
                let _ = framed
                    .send(WireMessage::Error("broker is at max_clients capacity".to_string()))
                    .await;
                return;
            };
            client_session::run_list(framed, state).await
        }
    }
}
