// src/core/reaper.rs

//! The Reaper: a background task that periodically reclaims clusters whose
//! bounded reservation has expired.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::metrics;
use crate::core::registry::Registry;

pub struct Reaper {
    registry: Arc<Registry>,
    interval: Duration,
}

impl Reaper {
    pub fn new(registry: Arc<Registry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Runs until `shutdown_rx` fires, sweeping expired reservations every
    /// tick. Each sweep is a single Registry lock acquisition; forwarding
    /// the synthetic RETURN requests happens outside the lock.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "reaper started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown_rx.recv() => {
                    info!("reaper shutting down");
                    return;
                }
            }
        }
    }

    fn sweep(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let expired = self.registry.reap_expired(now);
        if expired.is_empty() {
            debug!("reaper sweep found nothing expired");
            return;
        }
        metrics::REAPED_RESERVATIONS_TOTAL.inc_by(expired.len() as f64);
        info!(count = expired.len(), "reaper reclaimed expired reservations");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ClusterAdvertisement, ClusterState, ReservationInfo};
    use crate::core::registry::AgentHandle;
    use tokio::sync::mpsc::unbounded_channel;

    fn reserved_ad(id: &str, start: i64, duration: i32) -> ClusterAdvertisement {
        ClusterAdvertisement {
            cluster_id: id.to_string(),
            cluster_type: "dummy".to_string(),
            state: ClusterState::Reserved,
            request_id: "req-1".to_string(),
            head_node_ip: String::new(),
            nodes: vec![],
            reservation_info: Some(ReservationInfo {
                user_name: "alice".to_string(),
                reservation_start_time: start,
                duration,
            }),
        }
    }

    #[test]
    fn sweep_is_idempotent() {
        let registry = Registry::new();
        let (tx, _rx) = unbounded_channel();
        let agent = AgentHandle::new(tx);
        registry.apply_advertisement(&agent, reserved_ad("alpha", 0, 1));

        let first = registry.reap_expired(10_000);
        assert_eq!(first.len(), 1);

        let second = registry.reap_expired(10_000);
        assert!(second.is_empty());
    }

    #[test]
    fn unbounded_reservations_are_never_reaped() {
        let registry = Registry::new();
        let (tx, _rx) = unbounded_channel();
        let agent = AgentHandle::new(tx);
        registry.apply_advertisement(&agent, reserved_ad("alpha", 0, -1));

        assert!(registry.reap_expired(1_000_000).is_empty());
    }
}
