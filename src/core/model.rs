// src/core/model.rs

//! Wire-visible data types shared between agents, clients, and the broker:
//! `ClusterAdvertisement`, `ClusterRequest`, and the `Key` identity pair.

use serde::{Deserialize, Serialize};

/// The state of a single cluster as seen by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterState {
    Available,
    Reserved,
    Ready,
    Unavailable,
}

/// The operation a client requests against a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestType {
    Reserve,
    Extend,
    Return,
    Status,
}

/// A single machine or container within a cluster. Index 0 (by convention of
/// the caller) is the network node; indices 1..N are controller nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: u32,
    pub ip: String,
}

/// The terms of an active reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationInfo {
    pub user_name: String,
    /// Seconds since the Unix epoch.
    pub reservation_start_time: i64,
    /// Minutes. Negative means unbounded.
    pub duration: i32,
}

/// The broker's view of a single cluster's current state, advertised by the
/// owning agent and rebroadcast to subscribed clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAdvertisement {
    pub cluster_id: String,
    pub cluster_type: String,
    pub state: ClusterState,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub head_node_ip: String,
    #[serde(default)]
    pub nodes: Vec<ClusterNode>,
    #[serde(default)]
    pub reservation_info: Option<ReservationInfo>,
}

impl ClusterAdvertisement {
    pub fn key(&self) -> Key {
        Key {
            cluster_id: self.cluster_id.clone(),
            cluster_type: self.cluster_type.clone(),
        }
    }
}

/// Resource constraints and identity requested for a new reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationSpec {
    pub controller_nodes: u32,
    pub user_name: String,
    pub user_key: String,
}

/// An operation from a client: reserve, extend, return, or poll status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub request_id: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_type: String,
    /// Minutes. Negative means unbounded.
    #[serde(default)]
    pub duration: i32,
    #[serde(default)]
    pub spec: Option<ReservationSpec>,
}

/// The primary identity of a cluster inside the Registry: (cluster_id, cluster_type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub cluster_id: String,
    pub cluster_type: String,
}

impl Key {
    pub fn new(cluster_id: impl Into<String>, cluster_type: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            cluster_type: cluster_type.into(),
        }
    }
}

/// Builds the node list for a freshly-reserved cluster: index 0 is the
/// network node, indices 1..=controller_nodes are the controllers.
pub fn enumerate_nodes(controller_nodes: u32, base: u32) -> Vec<ClusterNode> {
    (0..=controller_nodes)
        .map(|i| ClusterNode {
            id: i,
            ip: ipv4_from_u32(base.wrapping_add(i)),
        })
        .collect()
}

fn ipv4_from_u32(v: u32) -> String {
    let [a, b, c, d] = v.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_nodes_includes_network_node_at_zero() {
        let nodes = enumerate_nodes(3, 1);
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].id, 0);
        assert_eq!(nodes[3].id, 3);
    }

    #[test]
    fn enumerate_nodes_zero_controllers_still_has_network_node() {
        let nodes = enumerate_nodes(0, 1);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, 0);
    }
}
