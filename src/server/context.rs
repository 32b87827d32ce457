// src/server/context.rs

//! Builds everything `server::run` needs before it can start accepting
//! connections: the engine, shared state, and the bound listener
//! (`spec.md` §4.3).

use crate::config::Config;
use crate::core::state::{ReplicationState, ServerState, SlaveofRequest};
use crate::engine::bitcask::BitcaskEngine;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

/// Holds everything the accept loop and background tasks need.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub slaveof_rx: Option<mpsc::Receiver<SlaveofRequest>>,
    pub background_tasks: JoinSet<()>,
}

impl ServerContext {
    pub async fn build(config: Config) -> Result<Self> {
        let engine = BitcaskEngine::open(config.data_dir.clone(), config.max_file_size)
            .with_context(|| format!("failed to open engine at '{}'", config.data_dir))?;

        let (slaveof_tx, slaveof_rx) = mpsc::channel(8);
        let replication = ReplicationState::new(slaveof_tx);
        let (shutdown_tx, _) = broadcast::channel(1);

        let state = ServerState::new(config.clone(), Arc::new(engine), replication, shutdown_tx.clone());

        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

        Ok(Self {
            state,
            listener,
            shutdown_tx,
            slaveof_rx: Some(slaveof_rx),
            background_tasks: JoinSet::new(),
        })
    }
}
