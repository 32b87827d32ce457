// src/commands/replication.rs

//! `SLAVEOF` and `BSYNC` (`spec.md` §4.5, §4.4).

use super::CommandHandler;
use crate::connection::Connection;
use crate::core::errors::BitserverError;
use crate::core::protocol::RespValue;
use crate::core::state::SlaveofRequest;
use crate::replication::master::handle_bsync;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

pub struct Slaveof;

#[async_trait]
impl CommandHandler for Slaveof {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let [a, b] = args else {
            return Err(BitserverError::WrongArgumentCount("SLAVEOF".into()));
        };
        let target = if a.eq_ignore_ascii_case(b"no") && b.eq_ignore_ascii_case(b"one") {
            None
        } else {
            let host = String::from_utf8(a.to_vec())
                .map_err(|_| BitserverError::Protocol("host is not valid utf-8".into()))?;
            let port: u16 = String::from_utf8_lossy(b)
                .parse()
                .map_err(|_| BitserverError::Protocol("port is not a valid integer".into()))?;
            Some((host, port))
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        conn.state
            .replication
            .slaveof_tx
            .send(SlaveofRequest { target, reply: reply_tx })
            .await
            .map_err(|_| BitserverError::Internal("replication daemon is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| BitserverError::Internal("replication daemon dropped the reply".into()))?;

        Ok(Some(RespValue::ok()))
    }
}

pub struct Bsync;

#[async_trait]
impl CommandHandler for Bsync {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        handle_bsync(conn, args).await
    }
}
