// src/core/protocol/framing.rs

//! The non-RESP framing used once a connection has been handed off to BSYNC.
//!
//! After the handshake's RESP exchange, both sides drop into a bespoke format:
//! lines of the shape `$<integer>\r\n`, and for each replicated record three such
//! lines (`fileId`, `offset`, `size`) followed by exactly `size` raw bytes.

use crate::core::errors::BitserverError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes a single `$<n>\r\n` line. Used both for record framing and for the
/// handshake's `$<startFileId>\r\n` response.
pub async fn write_dollar_line<W: AsyncWrite + Unpin>(
    w: &mut W,
    n: i64,
) -> Result<(), BitserverError> {
    let line = format!("${n}\r\n");
    w.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Reads a single `$<n>\r\n` line and returns `n`.
pub async fn read_dollar_line<R: AsyncRead + Unpin>(r: &mut R) -> Result<i64, BitserverError> {
    let mut byte = [0u8; 1];
    r.read_exact(&mut byte).await?;
    if byte[0] != b'$' {
        return Err(BitserverError::Protocol(format!(
            "expected '$' framing byte, got '{}'",
            byte[0] as char
        )));
    }
    let mut line = Vec::new();
    loop {
        r.read_exact(&mut byte).await?;
        if byte[0] == b'\r' {
            r.read_exact(&mut byte).await?;
            if byte[0] != b'\n' {
                return Err(BitserverError::Protocol("malformed framing line".into()));
            }
            break;
        }
        line.push(byte[0]);
    }
    std::str::from_utf8(&line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| BitserverError::Protocol("non-integer framing line".into()))
}

/// Writes one replicated record: `$<file_id>\r\n$<offset>\r\n$<size>\r\n` then `size` bytes.
pub async fn write_record_frame<W: AsyncWrite + Unpin>(
    w: &mut W,
    file_id: u64,
    offset: u64,
    bytes: &[u8],
) -> Result<(), BitserverError> {
    write_dollar_line(w, file_id as i64).await?;
    write_dollar_line(w, offset as i64).await?;
    write_dollar_line(w, bytes.len() as i64).await?;
    w.write_all(bytes).await?;
    Ok(())
}

/// Reads one replicated record's three-line header plus its payload.
pub async fn read_record_frame<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<(u64, u64, Vec<u8>), BitserverError> {
    let file_id = read_dollar_line(r).await?;
    let offset = read_dollar_line(r).await?;
    let size = read_dollar_line(r).await?;
    if file_id < 0 || offset < 0 || size < 0 {
        return Err(BitserverError::Protocol(
            "negative value in record frame header".into(),
        ));
    }
    let mut buf = vec![0u8; size as usize];
    r.read_exact(&mut buf).await?;
    Ok((file_id as u64, offset as u64, buf))
}
