// src/core/protocol/value.rs

//! The in-memory representation of a RESP2 reply, and requests parsed from the wire.

use bytes::Bytes;

/// A single RESP2 value, as sent on the wire in either direction.
///
/// This is a deliberately small subset: SimpleString, Error, Integer, BulkString
/// (with a `None` payload standing in for the RESP nil bulk string), and Array.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple(s: impl Into<Bytes>) -> Self {
        Self::SimpleString(s.into())
    }

    pub fn error(s: impl Into<Bytes>) -> Self {
        Self::Error(s.into())
    }

    pub fn bulk(b: impl Into<Bytes>) -> Self {
        Self::BulkString(Some(b.into()))
    }

    pub fn nil() -> Self {
        Self::BulkString(None)
    }

    pub fn ok() -> Self {
        Self::simple("OK")
    }
}

/// A request parsed off the wire: a command name plus its arguments, both raw bytes.
/// RESP requests are always flat arrays of bulk strings; this is the core's view of one.
#[derive(Debug, Clone)]
pub struct Request {
    pub args: Vec<Bytes>,
}

impl Request {
    pub fn command_name(&self) -> Option<&[u8]> {
        self.args.first().map(|b| b.as_ref())
    }
}
