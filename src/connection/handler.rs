// src/connection/handler.rs

//! `Connection` owns one client socket: a buffered RESP request loop, and a
//! write half shared (behind a mutex) with replication feeder tasks once
//! this connection is promoted to a slave feed (`spec.md` §4.1).

use crate::commands::CommandFlags;
use crate::core::errors::BitserverError;
use crate::core::protocol::{Request, RespValue, encode_to, read_request};
use crate::core::state::ServerState;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

pub struct Connection {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    pub session_id: u64,
    read_half: OwnedReadHalf,
    read_buf: BytesMut,
    pub write_half: Arc<AsyncMutex<OwnedWriteHalf>>,
    /// Set once this connection has been handed off to the replication
    /// subsystem (as a BSYNC slave feed); the request loop exits instead of
    /// trying to keep reading ordinary RESP requests.
    pub handed_off: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr, state: Arc<ServerState>, session_id: u64) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            addr,
            state,
            session_id,
            read_half,
            read_buf: BytesMut::with_capacity(4096),
            write_half: Arc::new(AsyncMutex::new(write_half)),
            handed_off: false,
        }
    }

    /// Raw access to the read half and a clone of the shared write half, for
    /// the BSYNC handshake/catch-up, which drops out of RESP framing into
    /// the bespoke length-prefixed byte format mid-connection. Both sides
    /// share the same underlying buffered reader/writer rather than
    /// re-wrapping the socket (`SPEC_FULL.md` §9).
    pub fn raw_io(&mut self) -> (&mut OwnedReadHalf, Arc<AsyncMutex<OwnedWriteHalf>>) {
        (&mut self.read_half, self.write_half.clone())
    }

    /// Encodes and writes one RESP reply under the write mutex.
    pub async fn write_value(&self, value: RespValue) -> Result<(), BitserverError> {
        let mut buf = BytesMut::new();
        encode_to(&value, &mut buf);
        let mut w = self.write_half.lock().await;
        w.write_all(&buf).await?;
        w.flush().await?;
        Ok(())
    }

    async fn read_request_with_deadline(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Request>, BitserverError> {
        tokio::time::timeout(timeout, read_request(&mut self.read_half, &mut self.read_buf))
            .await
            .unwrap_or_else(|_| {
                Err(BitserverError::Io(Arc::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "idle read timeout",
                ))))
            })
    }

    /// The per-connection request loop: decode one request at a time,
    /// dispatch it, and write back whatever the handler returns. `PING` is
    /// intercepted here and never reaches the registry — its only contract
    /// is "no error", not a reply (`spec.md` §4.1).
    pub async fn run(mut self) {
        let idle = Duration::from_secs(self.state.config.client_idle_timeout_secs);
        loop {
            let request = match self.read_request_with_deadline(idle).await {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    debug!(addr = %self.addr, error = %e, "connection closed");
                    break;
                }
            };

            let Some(name_bytes) = request.command_name() else {
                continue;
            };
            let cmd_name = String::from_utf8_lossy(name_bytes).to_lowercase();
            if cmd_name == "ping" {
                continue;
            }
            let args = &request.args[1..];

            match self.dispatch(&cmd_name, args).await {
                Ok(Some(resp)) => {
                    if let Err(e) = self.write_value(resp).await {
                        warn!(addr = %self.addr, error = %e, "write error, closing connection");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if self.write_value(e.to_resp()).await.is_err() {
                        break;
                    }
                }
            }

            if self.handed_off {
                break;
            }
        }
        self.state.connections.remove(&self.session_id);
    }

    async fn dispatch(
        &mut self,
        cmd_name: &str,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let registry = self.state.registry.clone();
        let Some((handler, flags)) = registry.get(cmd_name) else {
            return Err(BitserverError::UnknownCommand(cmd_name.to_string()));
        };
        if flags.contains(CommandFlags::WRITE) && self.state.replication.is_slave() {
            return Err(BitserverError::ReadOnly(
                "You can't write against a read only slave.".into(),
            ));
        }
        let handler = handler.clone();
        handler.execute(self, args).await
    }
}
