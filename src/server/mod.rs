// src/server/mod.rs

//! Top-level server orchestration: build the shared state, spawn background
//! tasks, apply an initial replication role if configured, then run the
//! accept loop (`spec.md` §4.3).

mod connection_loop;
mod context;
mod spawner;

use crate::config::Config;
use crate::core::state::SlaveofRequest;
use anyhow::Result;
use tokio::sync::oneshot;
use tracing::info;

pub use context::ServerContext;

/// Builds a bound, fully spawned server context without running its accept
/// loop yet. Split out from [`run`] so callers that need the bound address
/// before serving (tests) can inspect `ctx.listener` first.
pub async fn build(config: Config) -> Result<ServerContext> {
    let mut ctx = context::ServerContext::build(config).await?;
    spawner::spawn_all(&mut ctx)?;
    Ok(ctx)
}

/// Runs the accept loop until shutdown. See [`build`].
pub async fn serve(ctx: ServerContext) {
    connection_loop::run(ctx).await;
}

/// The main server startup function.
pub async fn run(config: Config) -> Result<()> {
    let initial_slaveof = config.slaveof.clone();
    let ctx = build(config).await?;

    if let Some((host, port)) = initial_slaveof {
        info!(%host, port, "applying configured initial replication role");
        let (reply_tx, reply_rx) = oneshot::channel();
        ctx.state
            .replication
            .slaveof_tx
            .send(SlaveofRequest {
                target: Some((host, port)),
                reply: reply_tx,
            })
            .await
            .ok();
        let _ = reply_rx.await;
    }

    serve(ctx).await;
    Ok(())
}
