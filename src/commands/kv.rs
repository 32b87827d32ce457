// src/commands/kv.rs

//! Thin adapters over the engine: `GET`, `SET`, `DEL` (`spec.md` §4.8).

use super::CommandHandler;
use crate::connection::Connection;
use crate::core::errors::BitserverError;
use crate::core::protocol::RespValue;
use async_trait::async_trait;
use bytes::Bytes;

pub struct Get;

#[async_trait]
impl CommandHandler for Get {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let [key] = args else {
            return Err(BitserverError::WrongArgumentCount("GET".into()));
        };
        match conn.state.engine.get(key)? {
            Some(value) => Ok(Some(RespValue::bulk(value))),
            None => Ok(Some(RespValue::nil())),
        }
    }
}

pub struct Set;

#[async_trait]
impl CommandHandler for Set {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        let [key, value] = args else {
            return Err(BitserverError::WrongArgumentCount("SET".into()));
        };
        conn.state.engine.set(key, value)?;
        Ok(Some(RespValue::ok()))
    }
}

pub struct Del;

#[async_trait]
impl CommandHandler for Del {
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError> {
        if args.is_empty() {
            return Err(BitserverError::WrongArgumentCount("DEL".into()));
        }
        let mut count = 0i64;
        for key in args {
            if conn.state.engine.del(key)? {
                count += 1;
            }
        }
        Ok(Some(RespValue::Integer(count)))
    }
}
