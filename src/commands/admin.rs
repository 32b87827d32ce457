// src/commands/admin.rs

//! `PING`, `COMMAND`, `ROLE`, `INFO`, `MERGE`, `FLUSHALL` (`spec.md` §4.6, §4.8).

use super::CommandHandler;
use crate::connection::Connection;
use crate::core::errors::BitserverError;
use crate::core::protocol::RespValue;
use async_trait::async_trait;
use bytes::Bytes;

/// Never actually reached — `Connection::run` intercepts `PING` before
/// dispatch and suppresses the reply entirely (`spec.md` §4.1). Registered
/// anyway so the command table is complete and a direct call through the
/// registry (e.g. from a test) behaves the same way.
pub struct Ping;

#[async_trait]
impl CommandHandler for Ping {
    async fn execute(
        &self,
        _conn: &mut Connection,
        _args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        Ok(None)
    }
}

pub struct CommandCmd;

#[async_trait]
impl CommandHandler for CommandCmd {
    async fn execute(
        &self,
        _conn: &mut Connection,
        _args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        Ok(Some(RespValue::Array(Vec::new())))
    }
}

pub struct Role;

#[async_trait]
impl CommandHandler for Role {
    async fn execute(
        &self,
        conn: &mut Connection,
        _args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let repl = &conn.state.replication;
        let master_addr = repl.master_addr.read().clone();
        let reply = match master_addr {
            None => {
                let slaves = repl
                    .slaves
                    .iter()
                    .map(|entry| RespValue::bulk(entry.value().peer_ip.clone()))
                    .collect();
                RespValue::Array(vec![RespValue::bulk("master"), RespValue::Array(slaves)])
            }
            Some(addr) => {
                let (host, port) = addr
                    .rsplit_once(':')
                    .map(|(h, p)| (h.to_string(), p.to_string()))
                    .unwrap_or((addr.clone(), "0".to_string()));
                let (sync_file_id, sync_offset) = repl.sync_cursor();
                RespValue::Array(vec![
                    RespValue::bulk("slave"),
                    RespValue::bulk(host),
                    RespValue::bulk(port),
                    RespValue::Integer(sync_file_id as i64),
                    RespValue::Integer(sync_offset as i64),
                ])
            }
        };
        Ok(Some(reply))
    }
}

pub struct Info;

#[async_trait]
impl CommandHandler for Info {
    async fn execute(
        &self,
        conn: &mut Connection,
        _args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let repl = &conn.state.replication;
        let role = if repl.is_slave() { "slave" } else { "master" };
        let body = format!(
            "role:{role}\r\nconnected_slaves:{}\r\ntcp_port:{}\r\n",
            repl.slaves.len(),
            conn.state.config.port,
        );
        Ok(Some(RespValue::bulk(body)))
    }
}

pub struct Merge;

#[async_trait]
impl CommandHandler for Merge {
    async fn execute(
        &self,
        conn: &mut Connection,
        _args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        conn.state.engine.merge();
        Ok(Some(RespValue::ok()))
    }
}

pub struct FlushAll;

#[async_trait]
impl CommandHandler for FlushAll {
    async fn execute(
        &self,
        conn: &mut Connection,
        _args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        conn.state.engine.clear_all()?;
        Ok(Some(RespValue::ok()))
    }
}
