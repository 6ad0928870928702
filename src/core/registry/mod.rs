// src/core/registry/mod.rs

//! The Registry: the broker's only mutable state. Clusters, the
//! request-id index, and per-cluster waiter queues all serialize on a
//! single `parking_lot::Mutex`, following the same synchronous-lock,
//! short-critical-section discipline the teacher uses in
//! `core::warden::worker::MasterMonitor`. The lock is held only to mutate
//! in-memory maps; it is never held across a network send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::model::{
    ClusterAdvertisement, ClusterRequest, ClusterState, Key, RequestType, ReservationInfo,
};

/// A one-shot reply slot a caller blocks on until the cluster it names
/// reaches READY, or is dropped (closed) if the cluster disappears first.
pub type Waiter = oneshot::Receiver<Option<ClusterAdvertisement>>;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_handle_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// An opaque, cheaply-cloned send target for the agent owning one or more
/// clusters. Matcher and Reaper use this to push `ClusterRequest`s outward
/// without ever touching the underlying stream.
#[derive(Clone)]
pub struct AgentHandle {
    id: u64,
    tx: mpsc::UnboundedSender<ClusterRequest>,
}

impl AgentHandle {
    pub fn new(tx: mpsc::UnboundedSender<ClusterRequest>) -> Self {
        Self {
            id: next_handle_id(),
            tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Best-effort send; a closed channel is logged by the caller's
    /// inbound read loop discovering the disconnect, not here.
    pub fn send(&self, req: ClusterRequest) {
        if self.tx.send(req).is_err() {
            debug!(agent = self.id, "dropped request to a disconnected agent");
        }
    }
}

impl PartialEq for AgentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for AgentHandle {}

/// An opaque, cheaply-cloned send target for a connected client session.
#[derive(Clone)]
pub struct ClientHandle {
    id: u64,
    tx: mpsc::UnboundedSender<ClusterAdvertisement>,
}

impl ClientHandle {
    pub fn new(tx: mpsc::UnboundedSender<ClusterAdvertisement>) -> Self {
        Self {
            id: next_handle_id(),
            tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(&self, ad: ClusterAdvertisement) {
        if self.tx.send(ad).is_err() {
            debug!(client = self.id, "dropped update to a disconnected client");
        }
    }
}

struct ClusterRecord {
    ad: ClusterAdvertisement,
    owner: AgentHandle,
}

#[derive(Default)]
struct RegistryState {
    clusters: HashMap<Key, ClusterRecord>,
    requests: HashMap<String, Key>,
    waiters: HashMap<Key, Vec<oneshot::Sender<Option<ClusterAdvertisement>>>>,
    clients: HashMap<u64, ClientHandle>,
    agents: HashMap<u64, AgentHandle>,
}

/// The Registry. All operations lock `state`, mutate, and release before
/// touching the network; broadcast recipient lists are copied out of the
/// lock and sent to outside of it.
#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_agent(&self, handle: AgentHandle) {
        self.state.lock().agents.insert(handle.id(), handle);
    }

    pub fn register_client(&self, handle: ClientHandle) {
        self.state.lock().clients.insert(handle.id(), handle);
    }

    pub fn deregister_client(&self, id: u64) {
        self.state.lock().clients.remove(&id);
    }

    pub fn deregister_agent(&self, id: u64) {
        self.state.lock().agents.remove(&id);
    }

    /// A point-in-time copy of every current advertisement, for a client's
    /// initial snapshot (§4.3) or the `List` RPC.
    pub fn snapshot(&self) -> Vec<ClusterAdvertisement> {
        self.state
            .lock()
            .clusters
            .values()
            .map(|r| r.ad.clone())
            .collect()
    }

    /// Upsert by Key; broadcasts to every client and resolves waiters if the
    /// new state is READY.
    pub fn apply_advertisement(&self, owner: &AgentHandle, ad: ClusterAdvertisement) {
        let key = ad.key();
        let mut ready_waiters = Vec::new();
        let (changed, recipients) = {
            let mut state = self.state.lock();

            if let Some(existing) = state.clusters.get(&key) {
                if !existing.ad.request_id.is_empty() && existing.ad.request_id != ad.request_id {
                    state.requests.remove(&existing.ad.request_id);
                }
            }

            let changed = state
                .clusters
                .get(&key)
                .map(|existing| existing.ad != ad)
                .unwrap_or(true);

            if !ad.request_id.is_empty() {
                state.requests.insert(ad.request_id.clone(), key.clone());
            }

            state.clusters.insert(
                key.clone(),
                ClusterRecord {
                    ad: ad.clone(),
                    owner: owner.clone(),
                },
            );

            if ad.state == ClusterState::Ready {
                if let Some(slots) = state.waiters.remove(&key) {
                    ready_waiters = slots;
                }
            }

            let recipients: Vec<ClientHandle> = state.clients.values().cloned().collect();
            (changed, recipients)
        };

        for slot in ready_waiters {
            let _ = slot.send(Some(ad.clone()));
        }

        if changed {
            for client in recipients {
                client.send(ad.clone());
            }
        }
    }

    /// O(1) lookup via the request-id index; heals a dangling entry whose
    /// cluster vanished by removing it and reporting a miss.
    pub fn lookup_by_request(&self, request_id: &str) -> Option<ClusterAdvertisement> {
        let mut state = self.state.lock();
        let key = state.requests.get(request_id).cloned()?;
        match state.clusters.get(&key) {
            Some(record) => Some(record.ad.clone()),
            None => {
                state.requests.remove(request_id);
                None
            }
        }
    }

    /// Looks up a cluster by its explicit `cluster_id`, regardless of
    /// state. Used to tell "no such cluster" apart from "that cluster
    /// exists but isn't available" when a RESERVE names one directly.
    pub fn find_by_cluster_id(&self, cluster_type: &str, cluster_id: &str) -> Option<ClusterAdvertisement> {
        let state = self.state.lock();
        state
            .clusters
            .values()
            .find(|record| {
                record.ad.cluster_id == cluster_id
                    && (cluster_type.is_empty() || record.ad.cluster_type == cluster_type)
            })
            .map(|record| record.ad.clone())
    }

    /// Scans for the first AVAILABLE cluster matching any non-empty
    /// `cluster_type`/`cluster_id` filter on the request. No scoring, no
    /// fairness guarantee: tie-break is iteration order.
    pub fn first_fit(&self, req: &ClusterRequest) -> Option<ClusterAdvertisement> {
        let state = self.state.lock();
        state
            .clusters
            .values()
            .find(|record| {
                record.ad.state == ClusterState::Available
                    && (req.cluster_type.is_empty() || req.cluster_type == record.ad.cluster_type)
                    && (req.cluster_id.is_empty() || req.cluster_id == record.ad.cluster_id)
            })
            .map(|record| record.ad.clone())
    }

    /// Marks `cluster` RESERVED for `req`, filling in `cluster_type`/
    /// `cluster_id` on the request if the caller left them empty, and
    /// indexes the request id. Broadcasts the new state; does not resolve
    /// any waiter (that only happens on READY).
    pub fn assign(&self, req: &mut ClusterRequest, cluster: &ClusterAdvertisement) {
        let key = cluster.key();
        if req.cluster_type.is_empty() {
            req.cluster_type = key.cluster_type.clone();
        }
        if req.cluster_id.is_empty() {
            req.cluster_id = key.cluster_id.clone();
        }

        let (ad, recipients) = {
            let mut state = self.state.lock();
            let Some(record) = state.clusters.get_mut(&key) else {
                return;
            };
            record.ad.state = ClusterState::Reserved;
            record.ad.request_id = req.request_id.clone();
            record.ad.reservation_info = Some(ReservationInfo {
                user_name: req
                    .spec
                    .as_ref()
                    .map(|s| s.user_name.clone())
                    .unwrap_or_default(),
                reservation_start_time: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0),
                duration: req.duration,
            });
            state
                .requests
                .insert(req.request_id.clone(), key.clone());

            let ad = record.ad.clone();
            let recipients: Vec<ClientHandle> = state.clients.values().cloned().collect();
            (ad, recipients)
        };
        for client in &recipients {
            client.send(ad.clone());
        }
    }

    /// The agent currently owning `key`, if any, for the Matcher and Reaper
    /// to forward requests to.
    pub fn owner_of(&self, key: &Key) -> Option<AgentHandle> {
        self.state.lock().clusters.get(key).map(|r| r.owner.clone())
    }

    /// Allocates a buffer-1 waiter for `key`. If the cluster is already
    /// READY the slot is fulfilled immediately; otherwise it joins the
    /// waiter queue and is resolved on the next READY advertisement, or
    /// dropped (closed) if the cluster is removed first.
    pub fn wait_for_ready(&self, key: &Key) -> Waiter {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        match state.clusters.get(key) {
            Some(record) if record.ad.state == ClusterState::Ready => {
                let _ = tx.send(Some(record.ad.clone()));
            }
            Some(_) => {
                state.waiters.entry(key.clone()).or_default().push(tx);
            }
            None => {
                // Key already gone; dropping `tx` closes the receiver.
            }
        }
        rx
    }

    /// Scans every RESERVED/READY cluster with a bounded, expired
    /// reservation, flips it to UNAVAILABLE in place (so it cannot be
    /// reassigned), and returns the synthetic RETURN requests to forward to
    /// each owning agent. Idempotent: a cluster already flipped to
    /// UNAVAILABLE by a prior sweep is skipped on the next one.
    pub fn reap_expired(&self, now: i64) -> Vec<(AgentHandle, ClusterRequest)> {
        let mut to_notify = Vec::new();
        let mut to_broadcast = Vec::new();

        {
            let mut state = self.state.lock();
            for record in state.clusters.values_mut() {
                if !matches!(record.ad.state, ClusterState::Reserved | ClusterState::Ready) {
                    continue;
                }
                let Some(info) = record.ad.reservation_info.as_ref() else {
                    continue;
                };
                if info.duration < 0 {
                    continue;
                }
                let end = info.reservation_start_time + i64::from(info.duration) * 60;
                if end >= now {
                    continue;
                }

                record.ad.state = ClusterState::Unavailable;

                let synthetic = ClusterRequest {
                    request_type: RequestType::Return,
                    request_id: record.ad.request_id.clone(),
                    cluster_id: record.ad.cluster_id.clone(),
                    cluster_type: record.ad.cluster_type.clone(),
                    duration: 0,
                    spec: None,
                };
                to_notify.push((record.owner.clone(), synthetic));
                to_broadcast.push(record.ad.clone());
            }

            if !to_broadcast.is_empty() {
                let recipients: Vec<ClientHandle> = state.clients.values().cloned().collect();
                for ad in &to_broadcast {
                    for client in &recipients {
                        client.send(ad.clone());
                    }
                }
            }
        }

        for (owner, req) in &to_notify {
            owner.send(req.clone());
        }
        to_notify
    }

    /// Tears down every cluster owned by `agent`: removes the record, its
    /// request-id entry, closes its waiters, and broadcasts UNAVAILABLE so
    /// clients observe the loss.
    pub fn revoke_agent(&self, agent: &AgentHandle) {
        let (removed, recipients) = {
            let mut state = self.state.lock();
            let keys: Vec<Key> = state
                .clusters
                .iter()
                .filter(|(_, record)| record.owner == *agent)
                .map(|(key, _)| key.clone())
                .collect();

            let mut removed = Vec::new();
            for key in &keys {
                if let Some(record) = state.clusters.remove(key) {
                    if !record.ad.request_id.is_empty() {
                        state.requests.remove(&record.ad.request_id);
                    }
                    state.waiters.remove(key);
                    let mut unavailable = record.ad;
                    unavailable.state = ClusterState::Unavailable;
                    unavailable.request_id.clear();
                    unavailable.reservation_info = None;
                    removed.push(unavailable);
                }
            }

            let recipients: Vec<ClientHandle> = state.clients.values().cloned().collect();
            (removed, recipients)
        };

        if !removed.is_empty() {
            warn!(agent = agent.id(), count = removed.len(), "revoked agent, clearing its clusters");
        }
        for ad in removed {
            for client in &recipients {
                client.send(ad.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{RequestType, ReservationInfo};
    use tokio::sync::mpsc::unbounded_channel;

    fn agent() -> (AgentHandle, mpsc::UnboundedReceiver<ClusterRequest>) {
        let (tx, rx) = unbounded_channel();
        (AgentHandle::new(tx), rx)
    }

    fn client() -> (ClientHandle, mpsc::UnboundedReceiver<ClusterAdvertisement>) {
        let (tx, rx) = unbounded_channel();
        (ClientHandle::new(tx), rx)
    }

    fn available_ad(id: &str) -> ClusterAdvertisement {
        ClusterAdvertisement {
            cluster_id: id.to_string(),
            cluster_type: "dummy".to_string(),
            state: ClusterState::Available,
            request_id: String::new(),
            head_node_ip: String::new(),
            nodes: vec![],
            reservation_info: None,
        }
    }

    #[test]
    fn apply_advertisement_indexes_request_id() {
        let registry = Registry::new();
        let (agent, _rx) = agent();

        let mut ad = available_ad("alpha");
        ad.state = ClusterState::Reserved;
        ad.request_id = "req-1".to_string();
        ad.reservation_info = Some(ReservationInfo {
            user_name: "alice".to_string(),
            reservation_start_time: 0,
            duration: 10,
        });
        registry.apply_advertisement(&agent, ad.clone());

        let looked_up = registry.lookup_by_request("req-1").unwrap();
        assert_eq!(looked_up.cluster_id, "alpha");
    }

    #[test]
    fn lookup_by_request_heals_a_dangling_entry() {
        let registry = Registry::new();
        let (agent, _rx) = agent();

        let mut ad = available_ad("alpha");
        ad.request_id = "req-1".to_string();
        registry.apply_advertisement(&agent, ad);
        registry.revoke_agent(&agent);

        assert!(registry.lookup_by_request("req-1").is_none());
        assert!(registry.lookup_by_request("req-1").is_none());
    }

    #[test]
    fn first_fit_respects_type_filter() {
        let registry = Registry::new();
        let (agent, _rx) = agent();
        registry.apply_advertisement(&agent, available_ad("alpha"));

        let mut other = available_ad("bravo");
        other.cluster_type = "other".to_string();
        registry.apply_advertisement(&agent, other);

        let req = ClusterRequest {
            request_type: RequestType::Reserve,
            request_id: "req-1".to_string(),
            cluster_id: String::new(),
            cluster_type: "other".to_string(),
            duration: 10,
            spec: None,
        };
        let found = registry.first_fit(&req).unwrap();
        assert_eq!(found.cluster_id, "bravo");
    }

    #[test]
    fn wait_for_ready_resolves_immediately_when_already_ready() {
        let registry = Registry::new();
        let (agent, _rx) = agent();

        let mut ad = available_ad("alpha");
        ad.state = ClusterState::Ready;
        ad.request_id = "req-1".to_string();
        registry.apply_advertisement(&agent, ad);

        let waiter = registry.wait_for_ready(&Key::new("alpha", "dummy"));
        let result = waiter.try_recv().unwrap();
        assert_eq!(result.unwrap().cluster_id, "alpha");
    }

    #[test]
    fn wait_for_ready_resolves_on_later_ready_advertisement() {
        let registry = Registry::new();
        let (agent, _rx) = agent();

        let mut reserved = available_ad("alpha");
        reserved.state = ClusterState::Reserved;
        reserved.request_id = "req-1".to_string();
        registry.apply_advertisement(&agent, reserved);

        let mut waiter = registry.wait_for_ready(&Key::new("alpha", "dummy"));
        assert!(waiter.try_recv().is_err());

        let mut ready = available_ad("alpha");
        ready.state = ClusterState::Ready;
        ready.request_id = "req-1".to_string();
        registry.apply_advertisement(&agent, ready);

        let result = waiter.try_recv().unwrap();
        assert_eq!(result.unwrap().state, ClusterState::Ready);
    }

    #[test]
    fn revoke_agent_closes_waiters_and_broadcasts_unavailable() {
        let registry = Registry::new();
        let (agent, _rx) = agent();
        let (client_handle, mut client_rx) = client();
        registry.register_client(client_handle);

        let mut reserved = available_ad("alpha");
        reserved.state = ClusterState::Reserved;
        reserved.request_id = "req-1".to_string();
        registry.apply_advertisement(&agent, reserved);

        let waiter = registry.wait_for_ready(&Key::new("alpha", "dummy"));
        registry.revoke_agent(&agent);

        assert!(registry.lookup_by_request("req-1").is_none());
        // Waiter slot closes; no value will ever arrive.
        drop(waiter);

        let mut saw_unavailable = false;
        while let Ok(ad) = client_rx.try_recv() {
            if ad.state == ClusterState::Unavailable {
                saw_unavailable = true;
            }
        }
        assert!(saw_unavailable);
    }

    #[test]
    fn assign_fills_in_empty_cluster_fields_on_the_request() {
        let registry = Registry::new();
        let (agent, _rx) = agent();
        registry.apply_advertisement(&agent, available_ad("alpha"));

        let mut req = ClusterRequest {
            request_type: RequestType::Reserve,
            request_id: "req-1".to_string(),
            cluster_id: String::new(),
            cluster_type: String::new(),
            duration: 10,
            spec: None,
        };
        let ad = registry.first_fit(&req).unwrap();
        registry.assign(&mut req, &ad);

        assert_eq!(req.cluster_id, "alpha");
        assert_eq!(req.cluster_type, "dummy");
        let reserved = registry.lookup_by_request("req-1").unwrap();
        assert_eq!(reserved.state, ClusterState::Reserved);
    }

    #[test]
    fn reserve_then_return_round_trips_to_available_with_empty_index() {
        let registry = Registry::new();
        let (agent, _rx) = agent();
        registry.apply_advertisement(&agent, available_ad("alpha"));

        let mut req = ClusterRequest {
            request_type: RequestType::Reserve,
            request_id: "req-1".to_string(),
            cluster_id: String::new(),
            cluster_type: String::new(),
            duration: 10,
            spec: None,
        };
        let ad = registry.first_fit(&req).unwrap();
        registry.assign(&mut req, &ad);
        assert!(registry.lookup_by_request("req-1").is_some());

        // The owning agent honors RETURN by re-advertising AVAILABLE with
        // the request_id cleared, exactly as a real agent would.
        registry.apply_advertisement(&agent, available_ad("alpha"));

        assert!(registry.lookup_by_request("req-1").is_none());
        let snapshot = registry.snapshot();
        let alpha = snapshot.iter().find(|a| a.cluster_id == "alpha").unwrap();
        assert_eq!(alpha.state, ClusterState::Available);
        assert!(alpha.request_id.is_empty());
    }

    #[test]
    fn single_owner_reservation_no_two_clusters_share_a_request_id() {
        let registry = Registry::new();
        let (agent, _rx) = agent();
        registry.apply_advertisement(&agent, available_ad("alpha"));
        registry.apply_advertisement(&agent, available_ad("bravo"));

        let mut req = ClusterRequest {
            request_type: RequestType::Reserve,
            request_id: "req-1".to_string(),
            cluster_id: "alpha".to_string(),
            cluster_type: "dummy".to_string(),
            duration: 10,
            spec: None,
        };
        let ad = registry.find_by_cluster_id("dummy", "alpha").unwrap();
        registry.assign(&mut req, &ad);

        // A second request naming a different cluster must not collide.
        let mut other = ClusterRequest {
            request_type: RequestType::Reserve,
            request_id: "req-2".to_string(),
            cluster_id: "bravo".to_string(),
            cluster_type: "dummy".to_string(),
            duration: 10,
            spec: None,
        };
        let bravo_ad = registry.find_by_cluster_id("dummy", "bravo").unwrap();
        registry.assign(&mut other, &bravo_ad);

        let snapshot = registry.snapshot();
        let request_ids: Vec<&str> = snapshot.iter().map(|a| a.request_id.as_str()).collect();
        assert!(request_ids.contains(&"req-1"));
        assert!(request_ids.contains(&"req-2"));
        assert_ne!(
            registry.lookup_by_request("req-1").unwrap().cluster_id,
            registry.lookup_by_request("req-2").unwrap().cluster_id
        );
    }
}
