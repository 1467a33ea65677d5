//! Wire framing and request decoding.
//!
//! One frame: an 8-digit zero-padded decimal byte count, a newline, then
//! exactly that many payload bytes. The payload is newline-separated tokens,
//! each escaped with the journal escaping rules; the first two tokens are
//! the `USE <database>` context, the third is the operation. Responses go
//! back as a single unframed byte string.

use crate::error::{Result, StoreError};
use crate::journal::codec;

/// Sentinel for a malformed or unroutable request.
pub const SENTINEL_MALFORMED: &str = "-1";
/// Sentinel for a payload that could not be decoded at all.
pub const SENTINEL_PARSE_FAULT: &str = "-2";
/// Sentinel for a `GET` with no results.
pub const SENTINEL_NO_RESULT: &str = "<none>";

/// Width of the frame length prefix.
pub const FRAME_LEN_DIGITS: usize = 8;

/// Frame a payload for the wire.
pub fn encode_frame(payload: &str) -> String {
    format!("{:08}\n{payload}", payload.len())
}

/// Extract the next complete frame from `buffer`, draining its bytes.
///
/// `Ok(None)` means more bytes are needed. A non-numeric length prefix or a
/// payload that is not UTF-8 poisons the connection: the caller answers
/// with a sentinel and drops it, since resynchronization is impossible.
pub fn next_frame(buffer: &mut Vec<u8>) -> Result<Option<String>> {
    if buffer.len() <= FRAME_LEN_DIGITS {
        return Ok(None);
    }
    let header = &buffer[..FRAME_LEN_DIGITS];
    if !header.iter().all(u8::is_ascii_digit) {
        return Err(StoreError::Protocol("frame length is not numeric".into()));
    }
    if buffer[FRAME_LEN_DIGITS] != b'\n' {
        return Err(StoreError::Protocol(
            "frame length is not newline-terminated".into(),
        ));
    }
    let length = header
        .iter()
        .fold(0usize, |n, digit| n * 10 + usize::from(digit - b'0'));
    let frame_end = FRAME_LEN_DIGITS + 1 + length;
    if buffer.len() < frame_end {
        return Ok(None);
    }
    let payload = buffer[FRAME_LEN_DIGITS + 1..frame_end].to_vec();
    buffer.drain(..frame_end);
    String::from_utf8(payload)
        .map(Some)
        .map_err(|_| StoreError::ParseFault("frame payload is not UTF-8".into()))
}

/// A decoded request with the `USE <database>` context stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Target database name.
    pub database: String,
    /// Operation name, e.g. `GET`.
    pub operation: String,
    /// Positional arguments, unescaped.
    pub args: Vec<String>,
}

/// Decode a frame payload into a request.
pub fn parse_request(payload: &str) -> Result<Request> {
    let tokens: Vec<String> = payload.split('\n').map(codec::unescape).collect();
    if tokens.len() < 3 {
        return Err(StoreError::Protocol(
            "request needs USE, a database and an operation".into(),
        ));
    }
    if tokens[0] != "USE" {
        return Err(StoreError::Protocol("request does not open with USE".into()));
    }
    Ok(Request {
        database: tokens[1].clone(),
        operation: tokens[2].clone(),
        args: tokens[3..].to_vec(),
    })
}

/// Build a request payload from already-plain tokens, escaping each.
pub fn build_payload(database: &str, operation: &str, args: &[String]) -> String {
    let mut tokens = vec![
        "USE".to_string(),
        codec::escape(database),
        codec::escape(operation),
    ];
    tokens.extend(args.iter().map(|arg| codec::escape(arg)));
    tokens.join("\n")
}
