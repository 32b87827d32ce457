// src/core/state/replication_state.rs

//! Replication-specific shared state: master-side slave bookkeeping, and the
//! slave-side `(syncFileId, syncOffset)` cursor plus the channel used to
//! drive `SLAVEOF` transitions into the replication daemon (`SPEC_FULL.md`
//! §5: "`masterAddr`... use an atomic string cell").

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

/// Per-slave bookkeeping the master side needs: a coalescing 1-slot notify
/// channel the replication notifier ticks, and the slave's address for
/// `ROLE`'s reply.
pub struct SlaveHandle {
    pub notify: mpsc::Sender<()>,
    pub peer_ip: String,
}

/// A request to transition replication role, sent by the `SLAVEOF` command
/// handler to the slave-side daemon. The daemon replies on `reply` only once
/// the transition has actually been applied, so the command doesn't return
/// `OK` prematurely (`spec.md` §4.5).
pub struct SlaveofRequest {
    pub target: Option<(String, u16)>,
    pub reply: oneshot::Sender<()>,
}

/// Replication state shared across connections and background tasks.
pub struct ReplicationState {
    /// `Some("host:port")` while acting as a slave; `None` while master.
    pub master_addr: RwLock<Option<String>>,
    /// Connected slaves, keyed by connection/session id.
    pub slaves: dashmap::DashMap<u64, SlaveHandle>,
    /// Channel into the slave-side daemon; `SLAVEOF`/`SLAVEOF NO ONE` send here.
    pub slaveof_tx: mpsc::Sender<SlaveofRequest>,
    /// This node's sync cursor while acting as a slave (`ROLE`'s reply).
    pub slave_sync_file_id: AtomicU64,
    pub slave_sync_offset: AtomicU64,
}

impl ReplicationState {
    pub fn new(slaveof_tx: mpsc::Sender<SlaveofRequest>) -> Self {
        Self {
            master_addr: RwLock::new(None),
            slaves: dashmap::DashMap::new(),
            slaveof_tx,
            slave_sync_file_id: AtomicU64::new(0),
            slave_sync_offset: AtomicU64::new(0),
        }
    }

    pub fn is_slave(&self) -> bool {
        self.master_addr.read().is_some()
    }

    pub fn set_sync_cursor(&self, file_id: u64, offset: u64) {
        self.slave_sync_file_id.store(file_id, Ordering::SeqCst);
        self.slave_sync_offset.store(offset, Ordering::SeqCst);
    }

    pub fn sync_cursor(&self) -> (u64, u64) {
        (
            self.slave_sync_file_id.load(Ordering::SeqCst),
            self.slave_sync_offset.load(Ordering::SeqCst),
        )
    }
}
