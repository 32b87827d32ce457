// src/server/connection_loop.rs

//! The main accept loop and graceful shutdown (`spec.md` §4.3).

use super::context::ServerContext;
use crate::connection::Connection;
use crate::core::state::ConnectionHandle;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for SIGINT/SIGTERM (Unix) or Ctrl-C (Windows).
async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
        }
    }
    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Ctrl-C received, initiating graceful shutdown");
    }
}

/// Accepts connections until shutdown, spawning one task per socket. On
/// shutdown, the broadcast signal unblocks every background task and slave
/// feeder (`spec.md` §4.3).
pub async fn run(mut ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => break,

            Some(res) = ctx.background_tasks.join_next() => {
                if let Err(e) = res {
                    error!(error = %e, "a background task panicked");
                }
            },

            accepted = ctx.listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        info!(%addr, "accepted connection");
                        let session_id = ctx.state.next_session_id();
                        ctx.state.connections.insert(session_id, ConnectionHandle { addr });
                        let state = ctx.state.clone();
                        client_tasks.spawn(async move {
                            Connection::new(socket, addr, state, session_id).run().await;
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!(error = ?e, "a client connection task panicked");
                }
            },
        }
    }

    info!("shutting down: signalling all background tasks");
    let _ = ctx.shutdown_tx.send(());

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
    info!("server shutdown complete");
}
