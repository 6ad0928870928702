// demos/dummy_agent.rs

//! A reference agent used to exercise the broker end-to-end: advertises a
//! handful of "dummy" clusters, honors RESERVE/EXTEND/RETURN by mutating its
//! own local state, and simulates a 5-second provisioning delay before
//! flipping a freshly reserved cluster to READY. Not part of the broker
//! itself; useful for manual testing and for the integration tests.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use warden::core::model::{
    ClusterAdvertisement, ClusterState, ReservationInfo, RequestType, enumerate_nodes,
};
use warden::core::protocol::{Hello, WireCodec, WireMessage};

const CLUSTER_TYPE: &str = "dummy";
const NUM_CELLS: usize = 3;
const PROVISION_DELAY_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "warden-dummy-agent", about = "A reference test agent for the Warden broker")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:1234")]
    addr: String,
}

struct DummyAgent {
    cells: HashMap<String, ClusterAdvertisement>,
}

impl DummyAgent {
    fn new() -> Self {
        let mut cells = HashMap::new();
        for i in 0..NUM_CELLS {
            let cluster_id = cluster_name(i);
            cells.insert(
                cluster_id.clone(),
                ClusterAdvertisement {
                    cluster_id,
                    cluster_type: CLUSTER_TYPE.to_string(),
                    state: ClusterState::Available,
                    request_id: String::new(),
                    head_node_ip: "1.2.3.4".to_string(),
                    nodes: Vec::new(),
                    reservation_info: None,
                },
            );
        }
        Self { cells }
    }

    /// Finds the cluster a request targets: by cluster_id if given, else the
    /// first AVAILABLE cell when reserving fresh.
    fn find_mut(&mut self, cluster_id: &str) -> Option<&mut ClusterAdvertisement> {
        if !cluster_id.is_empty() {
            return self.cells.get_mut(cluster_id);
        }
        let id = self
            .cells
            .values()
            .find(|ad| ad.state == ClusterState::Available)
            .map(|ad| ad.cluster_id.clone())?;
        self.cells.get_mut(&id)
    }

    fn handle(&mut self, req: WireMessage, reserved_tx: &mpsc::UnboundedSender<String>) -> Option<ClusterAdvertisement> {
        let WireMessage::Request(req) = req else {
            return None;
        };
        if !req.cluster_type.is_empty() && req.cluster_type != CLUSTER_TYPE {
            return None;
        }
        let cluster_id = req.cluster_id.clone();
        let ad = self.find_mut(&cluster_id)?;

        match req.request_type {
            RequestType::Reserve => {
                let spec = req.spec.as_ref()?;
                ad.state = ClusterState::Reserved;
                ad.request_id = req.request_id.clone();
                ad.nodes = enumerate_nodes(spec.controller_nodes, 1);
                ad.reservation_info = Some(ReservationInfo {
                    user_name: spec.user_name.clone(),
                    reservation_start_time: now_secs(),
                    duration: req.duration,
                });
                let _ = reserved_tx.send(ad.cluster_id.clone());
                Some(ad.clone())
            }
            RequestType::Extend => {
                if let Some(info) = ad.reservation_info.as_mut() {
                    info.duration = req.duration;
                }
                Some(ad.clone())
            }
            RequestType::Return => {
                ad.state = ClusterState::Available;
                ad.request_id = String::new();
                ad.nodes = Vec::new();
                ad.reservation_info = None;
                Some(ad.clone())
            }
            RequestType::Status => None,
        }
    }

    fn mark_ready(&mut self, cluster_id: &str) -> Option<ClusterAdvertisement> {
        let ad = self.cells.get_mut(cluster_id)?;
        if ad.state != ClusterState::Reserved {
            return None;
        }
        ad.state = ClusterState::Ready;
        ad.head_node_ip = "10.0.0.1".to_string();
        Some(ad.clone())
    }

    fn all(&self) -> Vec<ClusterAdvertisement> {
        self.cells.values().cloned().collect()
    }
}

fn cluster_name(i: usize) -> String {
    ((b'a' + i as u8) as char).to_string()
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stream = TcpStream::connect(&cli.addr).await?;
    let mut framed = Framed::new(stream, WireCodec::new());
    framed.send(WireMessage::Hello(Hello::Agent)).await?;

    let mut agent = DummyAgent::new();
    for ad in agent.all() {
        framed.send(WireMessage::Advertisement(ad)).await?;
    }

    // `reserved_tx` fires the moment a cell is reserved; each send spawns a
    // timer that reports back on `ready_tx` once the simulated provisioning
    // delay elapses.
    let (reserved_tx, mut reserved_rx) = mpsc::unbounded_channel::<String>();
    let (ready_tx, mut ready_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        if let Some(updated) = agent.handle(msg, &reserved_tx) {
                            framed.send(WireMessage::Advertisement(updated)).await?;
                        }
                    }
                    Some(Err(e)) => {
                        eprintln!("dummy agent: connection error: {e}");
                        return Ok(());
                    }
                    None => return Ok(()),
                }
            }
            Some(cluster_id) = reserved_rx.recv() => {
                let ready_tx = ready_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_secs(PROVISION_DELAY_SECS)).await;
                    let _ = ready_tx.send(cluster_id);
                });
            }
            Some(cluster_id) = ready_rx.recv() => {
                if let Some(ad) = agent.mark_ready(&cluster_id) {
                    framed.send(WireMessage::Advertisement(ad)).await?;
                }
            }
        }
    }
}
