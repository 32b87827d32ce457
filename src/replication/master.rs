// src/replication/master.rs

//! Master-side replication: the `BSYNC` handshake, catch-up, and the
//! steady-state per-slave feeder task (`spec.md` §4.4).

use crate::connection::Connection;
use crate::core::errors::BitserverError;
use crate::core::protocol::{RespValue, read_value, write_dollar_line};
use crate::core::state::{ServerState, SlaveHandle};
use crate::engine::Engine;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{info, warn};

/// Advances `(file_id, offset)` by flushing every record currently available
/// starting there, then, on hitting the end of a non-active file, moving on
/// to the next existing file id (`spec.md` §4.4's `syncDataFile`). A single
/// call may cross zero or more file boundaries; it never blocks waiting for
/// new data.
async fn sync_data_file(
    engine: &Arc<dyn Engine>,
    write_half: &Arc<AsyncMutex<OwnedWriteHalf>>,
    send_timeout: Duration,
    file_id: &mut u64,
    offset: &mut u64,
) -> Result<(), BitserverError> {
    if !engine.data_file_path(*file_id).exists() {
        if let Some(next) = engine.next_data_file_id(*file_id) {
            *file_id = next;
            *offset = 0;
        }
        return Ok(());
    }
    loop {
        match engine.ref_record(*file_id, *offset)? {
            Some(record) => {
                let mut w = write_half.lock().await;
                tokio::time::timeout(
                    send_timeout,
                    crate::core::protocol::write_record_frame(
                        &mut *w,
                        record.file_id,
                        record.offset,
                        &record.bytes,
                    ),
                )
                .await
                .map_err(|_| BitserverError::Replication("BSYNC send timed out".into()))??;
                drop(w);
                *offset += record.size;
            }
            None => {
                if *file_id < engine.active_file_id()
                    && let Some(next) = engine.next_data_file_id(*file_id)
                {
                    *file_id = next;
                    *offset = 0;
                } else {
                    return Ok(());
                }
            }
        }
    }
}

/// Reads the slave's file-meta array and picks the first point of
/// divergence against the master's own sealed files (`spec.md` §4.4 steps
/// 1-3): a master file missing from the slave's list, a mismatched id at the
/// same position, or a matching id with a different md5. Agreement through
/// the whole master list means "start at the active file".
fn pick_start_file_id(engine: &Arc<dyn Engine>, slave_metas: &[(u64, Bytes)]) -> Result<u64, BitserverError> {
    let master_metas = engine.file_metas()?;
    let mut i = 0;
    while i < master_metas.len() && i < slave_metas.len() {
        let master = &master_metas[i];
        let (slave_id, slave_md5) = &slave_metas[i];
        if master.file_id == *slave_id && master.md5.as_slice() == slave_md5.as_ref() {
            i += 1;
        } else {
            return Ok(master.file_id);
        }
    }
    if i < master_metas.len() {
        Ok(master_metas[i].file_id)
    } else {
        Ok(engine.active_file_id())
    }
}

fn parse_slave_metas(value: RespValue) -> Result<Vec<(u64, Bytes)>, BitserverError> {
    let RespValue::Array(items) = value else {
        return Err(BitserverError::Protocol(
            "expected a RESP array of file metas from slave".into(),
        ));
    };
    let mut metas = Vec::with_capacity(items.len());
    for item in items {
        let RespValue::Array(pair) = item else {
            return Err(BitserverError::Protocol("malformed file-meta entry".into()));
        };
        let [RespValue::Integer(file_id), RespValue::BulkString(Some(md5))] = pair.as_slice() else {
            return Err(BitserverError::Protocol("malformed file-meta entry".into()));
        };
        metas.push((*file_id as u64, md5.clone()));
    }
    Ok(metas)
}

/// Entry point for the `BSYNC runId fileId offset` command: runs the
/// handshake and catch-up inline, then hands the connection off to a spawned
/// feeder task and marks it for removal from the ordinary client loop.
pub async fn handle_bsync(conn: &mut Connection, args: &[Bytes]) -> Result<Option<RespValue>, BitserverError> {
    if args.len() != 3 {
        return Err(BitserverError::WrongArgumentCount("BSYNC".into()));
    }
    let peer_ip = conn.addr.ip().to_string();
    let send_timeout = Duration::from_secs(conn.state.config.bsync_send_timeout_secs);
    let engine = conn.state.engine.clone();

    let (read_half, write_half) = conn.raw_io();
    let mut read_buf = BytesMut::new();
    let value = read_value(read_half, &mut read_buf)
        .await?
        .ok_or_else(|| BitserverError::Protocol("slave closed connection during handshake".into()))?;
    let slave_metas = parse_slave_metas(value)?;

    let start_file_id = pick_start_file_id(&engine, &slave_metas)?;
    {
        let mut w = write_half.lock().await;
        write_dollar_line(&mut *w, start_file_id as i64).await?;
    }

    let mut file_id = start_file_id;
    let mut offset = 0u64;
    while file_id < engine.active_file_id() {
        sync_data_file(&engine, &write_half, send_timeout, &mut file_id, &mut offset).await?;
    }

    let (notify_tx, notify_rx) = mpsc::channel::<()>(1);
    let session_id = conn.session_id;
    conn.state.replication.slaves.insert(
        session_id,
        SlaveHandle {
            notify: notify_tx,
            peer_ip: peer_ip.clone(),
        },
    );

    info!(addr = %conn.addr, start_file_id, "slave caught up, entering steady state");
    spawn_feeder(
        conn.state.clone(),
        session_id,
        engine,
        write_half,
        send_timeout,
        notify_rx,
        file_id,
        offset,
    );

    conn.handed_off = true;
    Ok(None)
}

/// The steady-state per-slave task: wakes on every coalesced tick from the
/// replication notifier (or the initial notification backlog) and flushes
/// whatever new records exist. Exits (and deregisters the slave) on any I/O
/// error or server shutdown (`spec.md` §4.4's slave lifecycle).
#[allow(clippy::too_many_arguments)]
fn spawn_feeder(
    state: Arc<ServerState>,
    session_id: u64,
    engine: Arc<dyn Engine>,
    write_half: Arc<AsyncMutex<OwnedWriteHalf>>,
    send_timeout: Duration,
    mut notify_rx: mpsc::Receiver<()>,
    mut file_id: u64,
    mut offset: u64,
) {
    tokio::spawn(async move {
        let mut shutdown_rx = state.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                tick = notify_rx.recv() => {
                    if tick.is_none() {
                        break;
                    }
                    if let Err(e) = sync_data_file(&engine, &write_half, send_timeout, &mut file_id, &mut offset).await {
                        warn!(session_id, error = %e, "slave feeder lost connection");
                        break;
                    }
                }
            }
        }
        state.replication.slaves.remove(&session_id);
    });
}

/// Runs on a `replication_tick_ms` interval: a non-blocking send on every
/// slave's notify channel, coalescing bursts of writes into one wakeup per
/// tick (`spec.md` §9's load-bearing coalescing notifier).
pub async fn run_notifier(state: Arc<ServerState>) {
    let mut interval = tokio::time::interval(Duration::from_millis(state.config.replication_tick_ms));
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                for entry in state.replication.slaves.iter() {
                    let _ = entry.value().notify.try_send(());
                }
            }
        }
    }
}
