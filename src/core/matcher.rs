// src/core/matcher.rs

//! The Matcher: resolves an inbound `ClusterRequest` to a cluster and a
//! waiter, either by following the request-id index or, for a fresh
//! RESERVE, by first-fit assignment.

use tracing::debug;

use crate::core::errors::WardenError;
use crate::core::metrics;
use crate::core::model::{ClusterRequest, Key, RequestType};
use crate::core::registry::{Registry, Waiter};

/// Resolves `req` against the Registry, forwards it to the owning agent
/// (unless it's a STATUS poll), and returns a waiter for the cluster's
/// next READY transition.
pub fn process_request(registry: &Registry, mut req: ClusterRequest) -> Result<Waiter, WardenError> {
    metrics::REQUESTS_PROCESSED_TOTAL.inc();
    let cluster = match registry.lookup_by_request(&req.request_id) {
        Some(cluster) => cluster,
        None if req.request_type == RequestType::Reserve => {
            let candidate = match registry.first_fit(&req) {
                Some(candidate) => candidate,
                None => {
                    // Distinguish "that cluster is owned by someone else right
                    // now" from "no such cluster anywhere" per the resolved
                    // open question in SPEC_FULL.md §9.
                    if !req.cluster_id.is_empty()
                        && registry
                            .find_by_cluster_id(&req.cluster_type, &req.cluster_id)
                            .is_some()
                    {
                        return Err(WardenError::ClusterNotAvailable);
                    }
                    return Err(WardenError::NoAvailableClusters(req.request_id.clone()));
                }
            };
            registry.assign(&mut req, &candidate);
            registry
                .lookup_by_request(&req.request_id)
                .ok_or_else(|| WardenError::NoAvailableClusters(req.request_id.clone()))?
        }
        None => return Err(WardenError::NoAvailableClusters(req.request_id.clone())),
    };

    let key = cluster.key();

    if req.request_type != RequestType::Status {
        if let Some(owner) = registry.owner_of(&key) {
            owner.send(req.clone());
        } else {
            debug!(request_id = %req.request_id, "no owning agent to forward request to");
        }
    }

    Ok(registry.wait_for_ready(&key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ClusterAdvertisement, ClusterState};
    use crate::core::registry::AgentHandle;
    use tokio::sync::mpsc::unbounded_channel;

    fn request(request_type: RequestType, id: &str) -> ClusterRequest {
        ClusterRequest {
            request_type,
            request_id: id.to_string(),
            cluster_id: String::new(),
            cluster_type: String::new(),
            duration: 10,
            spec: None,
        }
    }

    #[test]
    fn reserve_with_no_available_cluster_fails() {
        let registry = Registry::new();
        let err = process_request(&registry, request(RequestType::Reserve, "req-1")).unwrap_err();
        assert_eq!(err, WardenError::NoAvailableClusters("req-1".to_string()));
    }

    #[test]
    fn reserve_assigns_and_forwards_to_the_owning_agent() {
        let registry = Registry::new();
        let (tx, mut rx) = unbounded_channel();
        let agent = AgentHandle::new(tx);
        registry.register_agent(agent.clone());

        registry.apply_advertisement(
            &agent,
            ClusterAdvertisement {
                cluster_id: "alpha".to_string(),
                cluster_type: "dummy".to_string(),
                state: ClusterState::Available,
                request_id: String::new(),
                head_node_ip: String::new(),
                nodes: vec![],
                reservation_info: None,
            },
        );

        let _waiter = process_request(&registry, request(RequestType::Reserve, "req-1")).unwrap();

        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.request_type, RequestType::Reserve);
        assert_eq!(forwarded.cluster_id, "alpha");
    }

    #[test]
    fn reserve_naming_an_already_reserved_cluster_fails_as_not_available() {
        let registry = Registry::new();
        let (tx, _rx) = unbounded_channel();
        let agent = AgentHandle::new(tx);
        registry.register_agent(agent.clone());

        registry.apply_advertisement(
            &agent,
            ClusterAdvertisement {
                cluster_id: "alpha".to_string(),
                cluster_type: "dummy".to_string(),
                state: ClusterState::Reserved,
                request_id: "req-1".to_string(),
                head_node_ip: String::new(),
                nodes: vec![],
                reservation_info: None,
            },
        );

        let mut req = request(RequestType::Reserve, "req-2");
        req.cluster_id = "alpha".to_string();
        let err = process_request(&registry, req).unwrap_err();
        assert_eq!(err, WardenError::ClusterNotAvailable);
    }

    #[test]
    fn status_never_forwards_to_the_agent() {
        let registry = Registry::new();
        let (tx, mut rx) = unbounded_channel();
        let agent = AgentHandle::new(tx);
        registry.register_agent(agent.clone());

        registry.apply_advertisement(
            &agent,
            ClusterAdvertisement {
                cluster_id: "alpha".to_string(),
                cluster_type: "dummy".to_string(),
                state: ClusterState::Reserved,
                request_id: "req-1".to_string(),
                head_node_ip: String::new(),
                nodes: vec![],
                reservation_info: None,
            },
        );

        let _waiter = process_request(&registry, request(RequestType::Status, "req-1")).unwrap();
        assert!(rx.try_recv().is_err());
    }
}
