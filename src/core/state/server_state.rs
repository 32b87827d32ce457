// src/core/state/server_state.rs

//! The central `ServerState` struct, holding all shared server-wide state.

use super::replication_state::ReplicationState;
use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::engine::Engine;
use crate::migration::Pool as MigrationPool;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Bookkeeping the server keeps per accepted connection (`spec.md` §4.3's
/// "connection set"). Actual teardown on shutdown goes through the client
/// task `JoinSet` in `server::connection_loop`, not through this handle.
pub struct ConnectionHandle {
    pub addr: SocketAddr,
}

/// The single shared handle threaded through every connection, command, and
/// background task: the engine, the command registry, the connection set,
/// replication state, and the slot-migration connection pool.
pub struct ServerState {
    pub engine: Arc<dyn Engine>,
    pub config: Arc<Config>,
    pub registry: Arc<CommandRegistry>,
    pub connections: DashMap<u64, ConnectionHandle>,
    pub replication: ReplicationState,
    pub migration_pool: MigrationPool,
    pub shutdown_tx: broadcast::Sender<()>,
    next_session_id: AtomicU64,
}

impl ServerState {
    pub fn new(
        config: Config,
        engine: Arc<dyn Engine>,
        replication: ReplicationState,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            config: Arc::new(config),
            registry: Arc::new(crate::commands::build_registry()),
            connections: DashMap::new(),
            replication,
            migration_pool: MigrationPool::new(),
            shutdown_tx,
            next_session_id: AtomicU64::new(0),
        })
    }

    /// Allocates the next session id for a newly accepted connection.
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}
