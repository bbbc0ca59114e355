// ABOUTME: Newline-delimited JSON-RPC wire codec for the backend's stdin/stdout streams
// ABOUTME: Encodes single-line envelopes, decodes responses, and reads size-capped frames
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::protocol::{JsonRpcError, JsonRpcResponse, JSONRPC_VERSION};
use crate::types::GatewayError;

/// Default maximum size of a single frame read from the backend (10 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Serialize an envelope as exactly one line terminated by `\n`
///
/// `serde_json` escapes control characters inside strings, so a raw control
/// byte in the output means the value could not be represented on one line.
pub fn encode<T: Serialize>(envelope: &T) -> Result<String, GatewayError> {
    let mut line = serde_json::to_string(envelope)
        .map_err(|e| GatewayError::encoding(format!("failed to serialize envelope: {e}")))?;

    if let Some(pos) = line.bytes().position(|b| b < 0x20) {
        return Err(GatewayError::encoding(format!(
            "serialized envelope contains control byte 0x{:02x} at offset {pos}",
            line.as_bytes()[pos]
        )));
    }

    line.push('\n');
    Ok(line)
}

/// Decode one line from the backend into a response envelope
///
/// Fails with `MalformedResponse` on invalid JSON, a non-object, or an
/// object carrying neither `result` nor `error`. A present-but-null
/// `result` counts as a result.
pub fn decode(line: &str) -> Result<JsonRpcResponse, GatewayError> {
    let value: Value = serde_json::from_str(line.trim_end())
        .map_err(|e| GatewayError::malformed_response(format!("invalid JSON from backend: {e}")))?;

    let Value::Object(mut obj) = value else {
        return Err(GatewayError::malformed_response(
            "backend line is not a JSON object",
        ));
    };

    let result = obj.remove("result");
    let error = match obj.remove("error") {
        Some(Value::Null) | None => None,
        Some(raw) => Some(serde_json::from_value::<JsonRpcError>(raw).map_err(|e| {
            GatewayError::malformed_response(format!("invalid error object from backend: {e}"))
        })?),
    };

    if result.is_none() && error.is_none() {
        return Err(GatewayError::malformed_response(
            "backend response has neither result nor error",
        ));
    }

    let jsonrpc = obj
        .remove("jsonrpc")
        .and_then(|v| v.as_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| JSONRPC_VERSION.to_owned());

    Ok(JsonRpcResponse {
        jsonrpc,
        id: obj.remove("id").filter(|id| !id.is_null()),
        result: if error.is_some() { None } else { result },
        error,
    })
}

/// What a single backend line turned out to be
#[derive(Debug)]
pub enum Inbound {
    /// A response to a request (strictly decoded)
    Response(JsonRpcResponse),
    /// A server-initiated notification; carries the method name
    Notification(String),
}

/// Classify a backend line, decoding it strictly when it is a response
pub fn classify(line: &str) -> Result<Inbound, GatewayError> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(line.trim_end()) {
        let has_id = obj.get("id").is_some_and(|id| !id.is_null());
        if !has_id {
            if let Some(method) = obj.get("method").and_then(Value::as_str) {
                return Ok(Inbound::Notification(method.to_owned()));
            }
        }
    }
    decode(line).map(Inbound::Response)
}

/// One frame read from the backend
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its terminator
    Line(String),
    /// A line longer than the cap; its bytes were consumed and dropped
    Oversized(usize),
}

/// Read one `\n`-terminated frame, enforcing a size cap
///
/// Returns `Ok(None)` at end of stream. An oversized line is consumed up to
/// its newline so the next read starts on a frame boundary.
pub async fn read_frame<R>(reader: &mut R, max_bytes: usize) -> std::io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut total = 0usize;
    let mut terminated = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            // EOF: a trailing unterminated line still counts as a frame
            if total == 0 {
                return Ok(None);
            }
            break;
        }

        let (chunk_len, done) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        total += chunk_len;
        if total <= max_bytes.saturating_add(1) {
            buf.extend_from_slice(&available[..chunk_len]);
        }
        reader.consume(chunk_len);

        if done {
            terminated = true;
            break;
        }
    }

    if terminated {
        total -= 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
    }

    if total > max_bytes {
        return Ok(Some(Frame::Oversized(total)));
    }

    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    String::from_utf8(buf).map_or_else(
        |e| {
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("backend line is not valid UTF-8: {e}"),
            ))
        },
        |line| Ok(Some(Frame::Line(line))),
    )
}
