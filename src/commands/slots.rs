// src/commands/slots.rs

//! Slot migration commands: `SLOTSHASHKEY`, `SLOTSINFO`, `SLOTSMGRTONE`,
//! `SLOTSMGRTSLOT`, `SLOTSMGRTTAGONE`, `SLOTSMGRTTAGSLOT`, `SLOTSRESTORE`
//! (`spec.md` §4.7).

use super::CommandHandler;
use crate::connection::Connection;
use crate::core::errors::BitserverError;
use crate::core::protocol::{RespValue, encode_to, read_value};
use crate::core::slot::{NUM_SLOTS, hashtag, key_slot};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

const MAX_EXPIRE_AT_MS: i64 = 1_000_000_000_000_000;

fn parse_str(arg: &Bytes, what: &'static str) -> Result<String, BitserverError> {
    String::from_utf8(arg.to_vec()).map_err(|_| BitserverError::Protocol(format!("{what} is not valid utf-8")))
}

fn parse_u16(arg: &Bytes, what: &'static str) -> Result<u16, BitserverError> {
    parse_str(arg, what)?
        .parse()
        .map_err(|_| BitserverError::Protocol(format!("{what} is not a valid integer")))
}

fn parse_i64(arg: &Bytes, what: &'static str) -> Result<i64, BitserverError> {
    parse_str(arg, what)?
        .parse()
        .map_err(|_| BitserverError::Protocol(format!("{what} is not a valid integer")))
}

fn compute_expire_at(ttlms: i64, now_ms: i64) -> i64 {
    if ttlms == 0 {
        0
    } else {
        (now_ms + ttlms).min(MAX_EXPIRE_AT_MS)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Sends one `SLOTSRESTORE` command carrying `triples` over a pooled
/// connection to `host:port`, and reports whether the peer's reply was the
/// plain `OK` `spec.md` §4.7 requires. A connection is only returned to the
/// pool when the round trip fully succeeds with that exact reply.
async fn send_restore(
    conn: &Connection,
    host: &str,
    port: u16,
    triples: &[(Bytes, i64, Bytes)],
) -> Result<bool, BitserverError> {
    let addr = format!("{host}:{port}");
    let connect_timeout = Duration::from_millis(conn.state.config.migration_connect_timeout_ms);
    let mut stream = conn.state.migration_pool.get(&addr, connect_timeout).await?;

    let mut request = vec![RespValue::bulk("SLOTSRESTORE")];
    for (key, ttlms, value) in triples {
        request.push(RespValue::bulk(key.clone()));
        request.push(RespValue::bulk(ttlms.to_string()));
        request.push(RespValue::bulk(value.clone()));
    }

    let mut out = BytesMut::new();
    encode_to(&RespValue::Array(request), &mut out);
    if let Err(e) = stream.write_all(&out).await {
        return Err(e.into());
    }

    let mut in_buf = BytesMut::new();
    let reply = read_value(&mut stream, &mut in_buf).await?;
    let ok = matches!(&reply, Some(RespValue::SimpleString(s)) if s.as_ref() == b"OK");
    if ok {
        conn.state.migration_pool.put(&addr, stream);
    }
    Ok(ok)
}

/// Migrates a single key: `spec.md` §4.7's `SLOTSMGRTONE` body, reused by the
/// non-tag slot variant.
async fn migrate_one_key(
    conn: &Connection,
    host: &str,
    port: u16,
    key: &Bytes,
) -> Result<i64, BitserverError> {
    let Some(value) = conn.state.engine.get(key)? else {
        return Ok(0);
    };
    let triples = [(key.clone(), 0i64, value)];
    if !send_restore(conn, host, port, &triples).await? {
        return Err(BitserverError::Migration(format!(
            "peer at {host}:{port} rejected SLOTSRESTORE"
        )));
    }
    conn.state.engine.del_local(key)?;
    Ok(1)
}

/// Migrates a key's whole hash-tag group as one atomic `SLOTSRESTORE`, or
/// falls back to a single-key migration when the key carries no explicit tag
/// (`spec.md` §4.7's `SLOTSMGRTTAGONE`).
async fn migrate_tag_group(
    conn: &Connection,
    host: &str,
    port: u16,
    key: &Bytes,
) -> Result<i64, BitserverError> {
    let tag = hashtag(key);
    if tag == key.as_ref() {
        return migrate_one_key(conn, host, port, key).await;
    }
    let keys = conn.state.engine.all_keys_with_tag(tag)?;
    let mut triples = Vec::with_capacity(keys.len());
    for k in &keys {
        if let Some(value) = conn.state.engine.get(k)? {
            triples.push((k.clone(), 0i64, value));
        }
    }
    if triples.is_empty() {
        return Ok(0);
    }
    if !send_restore(conn, host, port, &triples).await? {
        return Err(BitserverError::Migration(format!(
            "peer at {host}:{port} rejected SLOTSRESTORE"
        )));
    }
    let moved = triples.len() as i64;
    for (k, _, _) in &triples {
        conn.state.engine.del_local(k)?;
    }
    Ok(moved)
}

pub struct SlotsHashKey;

#[async_trait]
impl CommandHandler for SlotsHashKey {
    async fn execute(
        &self,
        _conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        if args.is_empty() {
            return Err(BitserverError::WrongArgumentCount("SLOTSHASHKEY".into()));
        }
        let slots = args
            .iter()
            .map(|key| RespValue::Integer(key_slot(key) as i64))
            .collect();
        Ok(Some(RespValue::Array(slots)))
    }
}

pub struct SlotsInfo;

#[async_trait]
impl CommandHandler for SlotsInfo {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        if args.len() > 2 {
            return Err(BitserverError::WrongArgumentCount("SLOTSINFO".into()));
        }
        let start = match args.first() {
            Some(arg) => parse_u16(arg, "start")? as usize,
            None => 0,
        };
        let count = match args.get(1) {
            Some(arg) => parse_u16(arg, "count")? as usize,
            None => NUM_SLOTS,
        };
        let end = start.saturating_add(count).min(NUM_SLOTS);
        let mut reply = Vec::new();
        for slot in start..end {
            let present = conn.state.engine.first_key_under_slot(slot as u16)?.is_some();
            reply.push(RespValue::Array(vec![
                RespValue::Integer(slot as i64),
                RespValue::Integer(if present { 1 } else { 0 }),
            ]));
        }
        Ok(Some(RespValue::Array(reply)))
    }
}

pub struct SlotsMgrtOne;

#[async_trait]
impl CommandHandler for SlotsMgrtOne {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let [host, port, _ttlms, key] = args else {
            return Err(BitserverError::WrongArgumentCount("SLOTSMGRTONE".into()));
        };
        let host = parse_str(host, "host")?;
        let port = parse_u16(port, "port")?;
        let n = migrate_one_key(conn, &host, port, key).await?;
        Ok(Some(RespValue::Integer(n)))
    }
}

pub struct SlotsMgrtTagOne;

#[async_trait]
impl CommandHandler for SlotsMgrtTagOne {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let [host, port, _ttlms, key] = args else {
            return Err(BitserverError::WrongArgumentCount("SLOTSMGRTTAGONE".into()));
        };
        let host = parse_str(host, "host")?;
        let port = parse_u16(port, "port")?;
        let n = migrate_tag_group(conn, &host, port, key).await?;
        Ok(Some(RespValue::Integer(n)))
    }
}

pub struct SlotsMgrtSlot;

#[async_trait]
impl CommandHandler for SlotsMgrtSlot {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let [host, port, _ttlms, slot] = args else {
            return Err(BitserverError::WrongArgumentCount("SLOTSMGRTSLOT".into()));
        };
        let host = parse_str(host, "host")?;
        let port = parse_u16(port, "port")?;
        let slot = parse_u16(slot, "slot")?;
        let Some(key) = conn.state.engine.first_key_under_slot(slot)? else {
            return Ok(Some(RespValue::Array(vec![
                RespValue::Integer(0),
                RespValue::Integer(0),
            ])));
        };
        let n = migrate_one_key(conn, &host, port, &key).await?;
        Ok(Some(RespValue::Array(vec![
            RespValue::Integer(n),
            RespValue::Integer(1),
        ])))
    }
}

pub struct SlotsMgrtTagSlot;

#[async_trait]
impl CommandHandler for SlotsMgrtTagSlot {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let [host, port, _ttlms, slot] = args else {
            return Err(BitserverError::WrongArgumentCount("SLOTSMGRTTAGSLOT".into()));
        };
        let host = parse_str(host, "host")?;
        let port = parse_u16(port, "port")?;
        let slot = parse_u16(slot, "slot")?;
        let Some(key) = conn.state.engine.first_key_under_slot(slot)? else {
            return Ok(Some(RespValue::Array(vec![
                RespValue::Integer(0),
                RespValue::Integer(0),
            ])));
        };
        let n = migrate_tag_group(conn, &host, port, &key).await?;
        Ok(Some(RespValue::Array(vec![
            RespValue::Integer(n),
            RespValue::Integer(1),
        ])))
    }
}

pub struct SlotsRestore;

#[async_trait]
impl CommandHandler for SlotsRestore {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        if args.is_empty() || args.len() % 3 != 0 {
            return Err(BitserverError::WrongArgumentCount("SLOTSRESTORE".into()));
        }
        let now = now_ms();
        for triple in args.chunks_exact(3) {
            let [key, ttlms, value] = triple else {
                unreachable!("chunks_exact(3) always yields 3 elements")
            };
            let ttlms = parse_i64(ttlms, "ttlms")?;
            let expire_at = compute_expire_at(ttlms, now);
            conn.state.engine.set_with_expire(key, value, expire_at)?;
        }
        Ok(Some(RespValue::ok()))
    }
}
