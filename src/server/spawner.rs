// src/server/spawner.rs

//! Spawns the server's long-running background tasks: the replication
//! notifier, the slave-side replication daemon, and the migration pool
//! sweeper (`spec.md` §5).

use super::context::ServerContext;
use crate::replication::{master, slave};
use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::info;

/// Spawns all background tasks into the context's `JoinSet`.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let state = ctx.state.clone();
    ctx.background_tasks.spawn(async move {
        master::run_notifier(state).await;
    });

    let slaveof_rx = ctx
        .slaveof_rx
        .take()
        .ok_or_else(|| anyhow!("replication daemon already spawned"))?;
    let state = ctx.state.clone();
    ctx.background_tasks.spawn(async move {
        slave::run_daemon(state, slaveof_rx).await;
    });

    let state = ctx.state.clone();
    ctx.background_tasks.spawn(async move {
        let idle = Duration::from_secs(state.config.migration_pool_idle_secs);
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut shutdown_rx = state.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => state.migration_pool.sweep(idle),
            }
        }
    });

    info!("background tasks spawned");
    Ok(())
}
