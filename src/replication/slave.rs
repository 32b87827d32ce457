// src/replication/slave.rs

//! Slave-side replication: the `SLAVEOF`-driven daemon and its per-attempt
//! sync task (`spec.md` §4.5).

use crate::core::errors::BitserverError;
use crate::core::protocol::{RespValue, encode_to, read_dollar_line, read_record_frame};
use crate::core::state::{ServerState, SlaveofRequest};
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// How long the retry timer is parked for while there is no active target
/// and no pending reconnect (`spec.md` §4.5: "parked at infinity (~10
/// years)").
const PARKED: Duration = Duration::from_secs(315_360_000);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// The single long-lived daemon task driving this node's replica role.
/// Receives `SLAVEOF` requests over `slaveof_rx`, owns the current sync
/// task's handle, and reconnects on loss with a 1 s backoff.
pub async fn run_daemon(state: Arc<ServerState>, mut slaveof_rx: mpsc::Receiver<SlaveofRequest>) {
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let (lost_tx, mut lost_rx) = mpsc::channel::<()>(1);
    let mut current_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut current_target: Option<(String, u16)> = None;
    let retry_sleep = tokio::time::sleep(PARKED);
    tokio::pin!(retry_sleep);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                if let Some(task) = current_task.take() {
                    task.abort();
                }
                break;
            }
            Some(request) = slaveof_rx.recv() => {
                if let Some(task) = current_task.take() {
                    task.abort();
                }
                match request.target {
                    None => {
                        *state.replication.master_addr.write() = None;
                        state.engine.enable_cache(true);
                        current_target = None;
                        info!("replication stopped, role is now master");
                        retry_sleep.as_mut().reset(Instant::now() + PARKED);
                    }
                    Some((host, port)) => {
                        let addr_display = format!("{host}:{port}");
                        *state.replication.master_addr.write() = Some(addr_display.clone());
                        state.engine.enable_cache(false);
                        current_target = Some((host.clone(), port));
                        info!(master = %addr_display, "replicating from new master");
                        current_task = Some(spawn_sync_task(state.clone(), host, port, lost_tx.clone()));
                        retry_sleep.as_mut().reset(Instant::now() + PARKED);
                    }
                }
                let _ = request.reply.send(());
            }
            Some(()) = lost_rx.recv() => {
                current_task = None;
                if current_target.is_some() {
                    retry_sleep.as_mut().reset(Instant::now() + RETRY_DELAY);
                }
            }
            () = &mut retry_sleep => {
                if let Some((host, port)) = current_target.clone() {
                    current_task = Some(spawn_sync_task(state.clone(), host, port, lost_tx.clone()));
                }
                retry_sleep.as_mut().reset(Instant::now() + PARKED);
            }
        }
    }
}

fn spawn_sync_task(
    state: Arc<ServerState>,
    host: String,
    port: u16,
    lost_tx: mpsc::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_sync_task(&state, &host, port).await {
            warn!(master = %format!("{host}:{port}"), error = %e, "replication connection lost");
        }
        let _ = lost_tx.send(()).await;
    })
}

/// Dials the master, runs the `spec.md` §4.4-mirrored handshake, then loops
/// applying incoming record frames until the connection fails.
async fn run_sync_task(state: &Arc<ServerState>, host: &str, port: u16) -> Result<(), BitserverError> {
    let addr = format!("{host}:{port}");
    let dial_timeout = Duration::from_millis(state.config.master_dial_timeout_ms);
    let mut stream = tokio::time::timeout(dial_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| BitserverError::Replication(format!("timed out dialing master {addr}")))??;

    let active_file_id = state.engine.active_file_id();
    let active_path = state.engine.data_file_path(active_file_id);
    let starting_offset = std::fs::metadata(&active_path).map(|m| m.len()).unwrap_or(0);

    let mut handshake = BytesMut::new();
    encode_to(
        &RespValue::Array(vec![
            RespValue::bulk("BSYNC"),
            RespValue::bulk(""),
            RespValue::bulk(active_file_id.to_string()),
            RespValue::bulk(starting_offset.to_string()),
        ]),
        &mut handshake,
    );
    stream.write_all(&handshake).await?;

    let own_metas = state.engine.file_metas()?;
    let mut metas_buf = BytesMut::new();
    let metas_value = RespValue::Array(
        own_metas
            .iter()
            .map(|m| {
                RespValue::Array(vec![
                    RespValue::Integer(m.file_id as i64),
                    RespValue::bulk(bytes::Bytes::copy_from_slice(&m.md5)),
                ])
            })
            .collect(),
    );
    encode_to(&metas_value, &mut metas_buf);
    stream.write_all(&metas_buf).await?;

    let start_file_id = read_dollar_line(&mut stream).await?;
    if start_file_id < 0 {
        return Err(BitserverError::Protocol("negative start file id from master".into()));
    }
    state.replication.set_sync_cursor(start_file_id as u64, 0);
    info!(master = %addr, start_file_id, "BSYNC handshake complete");

    loop {
        let (file_id, offset, bytes) = read_record_frame(&mut stream).await?;
        state.engine.sync_file(file_id, offset, &bytes)?;
        state.replication.set_sync_cursor(file_id, offset + bytes.len() as u64);
    }
}
