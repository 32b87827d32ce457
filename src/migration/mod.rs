// src/migration/mod.rs

//! Slot migration: the pooled outbound connections `SLOTSMGRT*` commands use
//! to talk `SLOTSRESTORE` to a peer (`spec.md` §4.7). Grounded on
//! `examples/original_source/migrate.go`'s connection pool (front-push on
//! release, close-on-error instead of returning, 1s sweeper with a 10s idle
//! timeout).

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::core::errors::BitserverError;

struct PooledConn {
    stream: TcpStream,
    last_used: Instant,
}

/// Idle connections to migration destinations, keyed by `"host:port"`.
pub struct Pool {
    inner: dashmap::DashMap<String, Mutex<VecDeque<PooledConn>>>,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            inner: dashmap::DashMap::new(),
        }
    }

    /// Pops an idle connection to `addr` if one exists; otherwise dials a
    /// fresh one, bounded by `connect_timeout`.
    pub async fn get(
        &self,
        addr: &str,
        connect_timeout: Duration,
    ) -> Result<TcpStream, BitserverError> {
        if let Some(list) = self.inner.get(addr)
            && let Some(conn) = list.lock().pop_front()
        {
            return Ok(conn.stream);
        }
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| BitserverError::Migration(format!("connect timeout dialing {addr}")))??;
        Ok(stream)
    }

    /// Returns a successfully-used connection to the front of its pool. A
    /// connection that errored is simply dropped by the caller instead of
    /// calling this (spec.md §4.7: "it is not returned to the pool").
    pub fn put(&self, addr: &str, stream: TcpStream) {
        self.inner
            .entry(addr.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()))
            .lock()
            .push_front(PooledConn {
                stream,
                last_used: Instant::now(),
            });
    }

    /// Closes connections idle longer than `idle` and drops empty pools.
    /// Intended to run on a 1s tick from a background task.
    pub fn sweep(&self, idle: Duration) {
        self.inner.retain(|_, list| {
            let mut guard = list.lock();
            guard.retain(|conn| conn.last_used.elapsed() < idle);
            !guard.is_empty()
        });
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}
