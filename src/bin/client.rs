// src/bin/client.rs

//! The Warden CLI client: `reserve | return | extend | status | list`.
//!
//! Talks the same wire protocol as `wardend` over a plain TCP connection;
//! argument parsing, key-file reading, and output formatting are the only
//! concerns here, the broker's Matcher/Registry do everything else.

use std::fs;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use uuid::Uuid;
use warden::core::model::{ClusterRequest, RequestType, ReservationSpec};
use warden::core::protocol::{Hello, WireCodec, WireMessage};

#[derive(Parser)]
#[command(name = "warden", about = "Client for the Warden cluster reservation broker")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Broker address.
    #[arg(long, default_value = "127.0.0.1:1234", global = true)]
    addr: String,

    /// Seconds to wait for a reply; -1 waits forever.
    #[arg(long, default_value_t = 30, global = true)]
    timeout: i64,
}

#[derive(Subcommand)]
enum Command {
    /// Reserve a cluster.
    Reserve {
        /// Requesting user's name.
        #[arg(long)]
        user: String,
        /// Path to the user's public SSH key.
        #[arg(long)]
        key: String,
        /// Reservation duration in minutes; negative means unbounded.
        #[arg(long, default_value_t = 60)]
        duration: i32,
        /// Number of controller nodes to request.
        #[arg(long, default_value_t = 1)]
        nodes: u32,
        /// Restrict to a specific cluster type.
        #[arg(long, default_value = "")]
        cluster_type: String,
        /// Restrict to a specific cluster id.
        #[arg(long, default_value = "")]
        cluster_id: String,
        /// Client-chosen request id; a UUID is generated if omitted.
        #[arg(long)]
        req_id: Option<String>,
    },
    /// Return a previously reserved cluster.
    Return {
        #[arg(long)]
        req_id: String,
    },
    /// Extend a previously reserved cluster's duration.
    Extend {
        #[arg(long)]
        req_id: String,
        #[arg(long, default_value_t = 60)]
        duration: i32,
    },
    /// Poll a reservation's status, blocking until READY.
    Status {
        #[arg(long)]
        req_id: String,
    },
    /// List the current inventory snapshot.
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::List => list(&cli.addr).await,
        Command::Reserve {
            user,
            key,
            duration,
            nodes,
            cluster_type,
            cluster_id,
            req_id,
        } => {
            let user_key = fs::read_to_string(&key)
                .map_err(|e| anyhow::anyhow!("failed to read key file '{key}': {e}"))?;
            let req = ClusterRequest {
                request_type: RequestType::Reserve,
                request_id: req_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                cluster_id,
                cluster_type,
                duration,
                spec: Some(ReservationSpec {
                    controller_nodes: nodes,
                    user_name: user,
                    user_key: user_key.trim().to_string(),
                }),
            };
            request(&cli.addr, req, cli.timeout).await
        }
        Command::Return { req_id } => {
            let req = ClusterRequest {
                request_type: RequestType::Return,
                request_id: req_id,
                cluster_id: String::new(),
                cluster_type: String::new(),
                duration: 0,
                spec: None,
            };
            request(&cli.addr, req, cli.timeout).await
        }
        Command::Extend { req_id, duration } => {
            let req = ClusterRequest {
                request_type: RequestType::Extend,
                request_id: req_id,
                cluster_id: String::new(),
                cluster_type: String::new(),
                duration,
                spec: None,
            };
            request(&cli.addr, req, cli.timeout).await
        }
        Command::Status { req_id } => {
            let req = ClusterRequest {
                request_type: RequestType::Status,
                request_id: req_id,
                cluster_id: String::new(),
                cluster_type: String::new(),
                duration: 0,
                spec: None,
            };
            request(&cli.addr, req, cli.timeout).await
        }
    }
}

async fn request(addr: &str, req: ClusterRequest, timeout_secs: i64) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let mut framed = Framed::new(stream, WireCodec::new());
    framed.send(WireMessage::Hello(Hello::ClientRequest)).await?;
    framed.send(WireMessage::Request(req)).await?;

    let reply = recv_with_timeout(&mut framed, timeout_secs).await?;
    match reply {
        Some(WireMessage::Advertisement(ad)) => {
            println!("{}", serde_json::to_string_pretty(&ad)?);
            Ok(())
        }
        Some(WireMessage::Error(msg)) => Err(anyhow::anyhow!(msg)),
        Some(other) => Err(anyhow::anyhow!("unexpected reply frame: {other:?}")),
        None => Err(anyhow::anyhow!("connection closed before a reply arrived")),
    }
}

async fn list(addr: &str) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let mut framed = Framed::new(stream, WireCodec::new());
    framed.send(WireMessage::Hello(Hello::ClientList)).await?;

    loop {
        match framed.next().await {
            Some(Ok(WireMessage::Advertisement(ad))) => {
                println!("{}", serde_json::to_string(&ad)?);
            }
            Some(Ok(WireMessage::ListEnd)) | None => return Ok(()),
            Some(Ok(other)) => return Err(anyhow::anyhow!("unexpected frame: {other:?}")),
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn recv_with_timeout(
    framed: &mut Framed<TcpStream, WireCodec>,
    timeout_secs: i64,
) -> anyhow::Result<Option<WireMessage>> {
    if timeout_secs < 0 {
        return Ok(framed.next().await.transpose()?);
    }
    let fut = framed.next();
    match tokio::time::timeout(Duration::from_secs(timeout_secs as u64), fut).await {
        Ok(result) => Ok(result.transpose()?),
        Err(_) => Err(anyhow::anyhow!("timed out waiting for a reply")),
    }
}
