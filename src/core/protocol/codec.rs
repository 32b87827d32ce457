// src/core/protocol/codec.rs

//! RESP2 framing: `RespCodec` implements `tokio_util::codec::{Decoder, Encoder}`
//! for `RespValue`, covering SimpleString, Error, Integer, BulkString, and Array.

use super::value::{Request, RespValue};
use crate::core::errors::BitserverError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Bound on nested array elements and bulk string size, against malformed/hostile input.
const MAX_ARRAY_ELEMENTS: i64 = 1024 * 1024;
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

/// Finds the next `\r\n` in `src` starting at `from`, returning the index of `\r`.
fn find_crlf(src: &[u8], from: usize) -> Option<usize> {
    src[from..]
        .windows(2)
        .position(|w| w == CRLF)
        .map(|i| from + i)
}

/// Parses one RESP value out of `src`, returning `(value, bytes_consumed)`.
/// Returns `Ok(None)` if `src` doesn't yet contain a complete value.
fn parse_value(src: &[u8]) -> Result<Option<(RespValue, usize)>, BitserverError> {
    if src.is_empty() {
        return Ok(None);
    }
    let kind = src[0];
    let Some(line_end) = find_crlf(src, 1) else {
        return Ok(None);
    };
    let line = &src[1..line_end];
    let consumed_header = line_end + 2;

    match kind {
        b'+' => Ok(Some((
            RespValue::SimpleString(Bytes::copy_from_slice(line)),
            consumed_header,
        ))),
        b'-' => Ok(Some((
            RespValue::Error(Bytes::copy_from_slice(line)),
            consumed_header,
        ))),
        b':' => {
            let n = parse_i64(line)?;
            Ok(Some((RespValue::Integer(n), consumed_header)))
        }
        b'$' => {
            let len = parse_i64(line)?;
            if len < 0 {
                return Ok(Some((RespValue::BulkString(None), consumed_header)));
            }
            if len > MAX_BULK_LEN {
                return Err(BitserverError::Protocol("bulk string too large".into()));
            }
            let len = len as usize;
            let total = consumed_header + len + 2;
            if src.len() < total {
                return Ok(None);
            }
            let data = Bytes::copy_from_slice(&src[consumed_header..consumed_header + len]);
            if &src[consumed_header + len..total] != CRLF {
                return Err(BitserverError::Protocol(
                    "bulk string missing terminating CRLF".into(),
                ));
            }
            Ok(Some((RespValue::BulkString(Some(data)), total)))
        }
        b'*' => {
            let count = parse_i64(line)?;
            if count < 0 {
                return Ok(Some((RespValue::Array(Vec::new()), consumed_header)));
            }
            if count > MAX_ARRAY_ELEMENTS {
                return Err(BitserverError::Protocol("array too large".into()));
            }
            let mut offset = consumed_header;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match parse_value(&src[offset..])? {
                    Some((value, used)) => {
                        items.push(value);
                        offset += used;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(items), offset)))
        }
        other => Err(BitserverError::Protocol(format!(
            "unexpected type byte '{}'",
            other as char
        ))),
    }
}

fn parse_i64(line: &[u8]) -> Result<i64, BitserverError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| BitserverError::Protocol("invalid integer in RESP line".into()))
}

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = BitserverError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse_value(src)? {
            Some((value, consumed)) => {
                src.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = BitserverError;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_value(&item, dst);
        Ok(())
    }
}

fn encode_value(value: &RespValue, dst: &mut BytesMut) {
    match value {
        RespValue::SimpleString(s) => {
            dst.put_u8(b'+');
            dst.extend_from_slice(s);
            dst.extend_from_slice(CRLF);
        }
        RespValue::Error(s) => {
            dst.put_u8(b'-');
            dst.extend_from_slice(s);
            dst.extend_from_slice(CRLF);
        }
        RespValue::Integer(n) => {
            dst.put_u8(b':');
            dst.extend_from_slice(n.to_string().as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespValue::BulkString(None) => {
            dst.extend_from_slice(b"$-1\r\n");
        }
        RespValue::BulkString(Some(b)) => {
            dst.put_u8(b'$');
            dst.extend_from_slice(b.len().to_string().as_bytes());
            dst.extend_from_slice(CRLF);
            dst.extend_from_slice(b);
            dst.extend_from_slice(CRLF);
        }
        RespValue::Array(items) => {
            dst.put_u8(b'*');
            dst.extend_from_slice(items.len().to_string().as_bytes());
            dst.extend_from_slice(CRLF);
            for item in items {
                encode_value(item, dst);
            }
        }
    }
}

/// Encodes `value` into `dst`, for callers that drive their own read/write
/// loop directly against a socket instead of going through `Encoder`.
pub fn encode_to(value: &RespValue, dst: &mut BytesMut) {
    encode_value(value, dst);
}

/// Reads one RESP value off `reader`, buffering into `buf` across calls.
/// Returns `Ok(None)` only on a clean EOF with nothing left to parse.
pub async fn read_value<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> Result<Option<RespValue>, BitserverError> {
    loop {
        if let Some((value, consumed)) = parse_value(buf)? {
            buf.advance(consumed);
            return Ok(Some(value));
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(BitserverError::IncompleteData)
            };
        }
    }
}

/// Reads one RESP value off `reader` and converts it into a flat `Request`.
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> Result<Option<Request>, BitserverError> {
    match read_value(reader, buf).await? {
        Some(value) => Ok(Some(request_from_value(value)?)),
        None => Ok(None),
    }
}

/// Converts a decoded `RespValue` into a flat `Request`. Real clients always send
/// requests as an array of bulk strings; anything else is a protocol error.
pub fn request_from_value(value: RespValue) -> Result<Request, BitserverError> {
    match value {
        RespValue::Array(items) => {
            let mut args = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    RespValue::BulkString(Some(b)) => args.push(b),
                    _ => {
                        return Err(BitserverError::Protocol(
                            "request arguments must be bulk strings".into(),
                        ));
                    }
                }
            }
            Ok(Request { args })
        }
        _ => Err(BitserverError::Protocol(
            "request must be a RESP array".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: RespValue) {
        let mut buf = BytesMut::new();
        RespCodec.encode(value.clone(), &mut buf).unwrap();
        let decoded = RespCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, value);
        assert!(buf.is_empty());
    }

    #[test]
    fn roundtrips_each_type() {
        roundtrip(RespValue::simple("OK"));
        roundtrip(RespValue::error("ERR boom"));
        roundtrip(RespValue::Integer(-42));
        roundtrip(RespValue::bulk("hello"));
        roundtrip(RespValue::nil());
        roundtrip(RespValue::Array(vec![
            RespValue::Integer(1),
            RespValue::bulk("a"),
            RespValue::nil(),
        ]));
    }

    #[test]
    fn incomplete_frame_yields_none() {
        let mut buf = BytesMut::from(&b"$5\r\nhel"[..]);
        assert!(RespCodec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"lo\r\n");
        let decoded = RespCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, RespValue::bulk("hello"));
    }

    #[test]
    fn request_from_array_of_bulk_strings() {
        let value = RespValue::Array(vec![RespValue::bulk("SET"), RespValue::bulk("k")]);
        let req = request_from_value(value).unwrap();
        assert_eq!(req.args, vec![Bytes::from("SET"), Bytes::from("k")]);
    }
}
