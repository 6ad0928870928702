// src/server/connection_loop.rs

//! The main server loop: accepts connections and handles graceful shutdown.

use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::context::ServerContext;
use crate::connection;

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for a shutdown signal based on the operating system.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to create SIGINT stream");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to create SIGTERM stream");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("failed to create Ctrl+C stream");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, initiating graceful shutdown."); } } => {},
    }
}

/// The main accept loop. Runs until a shutdown signal arrives or a
/// background task dies unexpectedly.
pub async fn run(mut ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => {
                break;
            },

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => info!("a background task completed"),
                    Ok(Err(e)) => { error!("CRITICAL: background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("accepted new connection from {}", addr);
                        let state = ctx.state.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();
                        client_tasks.spawn(async move {
                            connection::handle_connection(socket, addr, state, shutdown_rx).await;
                        });
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("a connection handler panicked: {e:?}");
                    }
                }
            },
        }
    }

    info!("shutting down, signaling all tasks");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("failed to send shutdown signal; no tasks were listening");
    }

    client_tasks.shutdown().await;
    info!("all client connections closed");

    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("timed out waiting for background tasks to finish cleanly");
    }
    info!("broker shutdown complete");
}
