//! # RESP2 Encoding and Parsing
//!
//! Encodes the three commands the facade issues and parses the reply shapes
//! they produce (simple strings, errors, integers, bulk strings).
//!
//! Arrays never answer GET/SETEX/DEL, so they are reported as protocol
//! errors instead of being parsed.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{FacadeError, Result};

/// Largest bulk string accepted from the store (Redis `proto-max-bulk-len`).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// RESP reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK style replies.
    Simple(Vec<u8>),
    /// -ERR ... replies.
    Error(Vec<u8>),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one RESP value from the buffered reader.
pub async fn read_response<R>(reader: &mut R, line_buf: &mut Vec<u8>) -> Result<RespValue>
where
    R: AsyncBufRead + Unpin,
{
    read_line(reader, line_buf).await?;
    if line_buf.is_empty() {
        return Err(protocol("empty reply line"));
    }

    match line_buf[0] {
        b'+' => Ok(RespValue::Simple(line_buf[1..].to_vec())),
        b'-' => Ok(RespValue::Error(line_buf[1..].to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            read_bulk(reader, len).await
        }
        b'*' => Err(protocol("unexpected array reply")),
        other => Err(protocol(format!("unknown reply type byte 0x{:02x}", other))),
    }
}

async fn read_bulk<R>(reader: &mut R, len: i64) -> Result<RespValue>
where
    R: AsyncBufRead + Unpin,
{
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    if len > MAX_BULK_LEN {
        return Err(protocol("bulk length exceeds limit"));
    }

    // Grow with the bytes that actually arrive instead of trusting the header
    let wanted = len as u64 + 2;
    let mut data = Vec::new();
    (&mut *reader).take(wanted).read_to_end(&mut data).await?;
    if (data.len() as u64) < wanted {
        return Err(FacadeError::connection("connection closed by peer"));
    }
    if !data.ends_with(b"\r\n") {
        return Err(protocol("bulk string missing CRLF terminator"));
    }
    data.truncate(len as usize);
    Ok(RespValue::Bulk(Some(data)))
}

async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let bytes = reader.read_until(b'\n', buf).await?;
    if bytes == 0 {
        return Err(FacadeError::connection("connection closed by peer"));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(protocol("reply line missing CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> Result<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| protocol("invalid integer"))
}

fn protocol(msg: impl Into<String>) -> FacadeError {
    FacadeError::connection(format!("protocol error: {}", msg.into()))
}
