// src/core/protocol/message.rs

//! The handshake and per-connection frame types multiplexed over the single
//! listening TCP port. Every connection exchanges a stream of `WireMessage`
//! values; the first one is always a `Hello`.

use crate::core::model::{ClusterAdvertisement, ClusterRequest};
use serde::{Deserialize, Serialize};

/// The very first frame sent by a peer after connecting, declaring which of
/// the four RPCs (spec.md §6) this connection implements for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hello {
    /// `ClusterAgentService.AgentClusters`: bidirectional, agent-owned.
    Agent,
    /// `ClusterClientService.ServerClusters`: bidirectional, client-owned.
    ClientStream,
    /// `ClusterClientService.Request`: single request, single reply.
    ClientRequest,
    /// `ClusterClientService.List`: one-shot snapshot dump.
    ClientList,
}

/// A single multiplexed frame exchanged over a connection.
///
/// The first `WireMessage` on every connection is always `Hello`; every
/// message after that is legal only in the direction and shape implied by
/// that handshake:
/// - `Agent`: inbound `Advertisement`, outbound `Request`.
/// - `ClientStream`: inbound `Request`, outbound `Advertisement`.
/// - `ClientRequest`: one inbound `Request`, then one outbound `Advertisement`
///   or `Error`.
/// - `ClientList`: no inbound frames; outbound `Advertisement`* then `ListEnd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    Hello(Hello),
    Advertisement(ClusterAdvertisement),
    Request(ClusterRequest),
    Error(String),
    ListEnd,
}
