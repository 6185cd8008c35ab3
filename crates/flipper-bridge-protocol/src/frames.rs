//! Reply frames written back to the host.
//!
//! Status replies are single lines prefixed with a bracket tag. A successful
//! HTTP transaction instead starts with a response head
//! `[<status>][<content-length>]` followed directly by the body bytes, with
//! no separator and no terminator.

use std::fmt;

use flipper_bridge_core::ResponseHead;

/// A single-line reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `[SUCCESS] <message>`
    Success(String),
    /// `[INFO] <message>`
    Info(String),
    /// `[ERROR] <message>`
    Error(String),
    /// `[DISCONNECTED] <message>`
    Disconnected(String),
    /// `[SOCKET/CONNECTED] <message>`
    SocketConnected(String),
    /// `[SOCKET/STOPPED] <message>`
    SocketStopped(String),
    /// `[PONG]`
    Pong,
    /// A bare value line (version, IP, JSON listings).
    Value(String),
}

impl Reply {
    /// Error frame carrying an error's display text.
    pub fn error(err: impl fmt::Display) -> Self {
        Reply::Error(err.to_string())
    }

    /// The frame as written to the serial link, newline included.
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Success(msg) => write!(f, "[SUCCESS] {}", msg),
            Reply::Info(msg) => write!(f, "[INFO] {}", msg),
            Reply::Error(msg) => write!(f, "[ERROR] {}", msg),
            Reply::Disconnected(msg) => write!(f, "[DISCONNECTED] {}", msg),
            Reply::SocketConnected(msg) => write!(f, "[SOCKET/CONNECTED] {}", msg),
            Reply::SocketStopped(msg) => write!(f, "[SOCKET/STOPPED] {}", msg),
            Reply::Pong => f.write_str("[PONG]"),
            Reply::Value(value) => f.write_str(value),
        }
    }
}

/// Encode a response head, e.g. `[200][2]` or `[200][-1]`.
pub fn encode_head(head: &ResponseHead) -> String {
    format!("[{}][{}]", head.status, head.wire_length())
}

/// Split a response head off the front of a serial capture.
///
/// Returns the head and the number of bytes it occupied. Used by hosts and
/// tests reading the bridge output.
pub fn decode_head(bytes: &[u8]) -> Option<(ResponseHead, usize)> {
    let (status, after_status) = bracketed(bytes)?;
    let (length, after_length) = bracketed(&bytes[after_status..])?;

    let status: u16 = status.parse().ok()?;
    let length: i64 = length.parse().ok()?;
    let content_length = if length < 0 {
        None
    } else {
        Some(length as u64)
    };

    Some((
        ResponseHead::new(status, content_length),
        after_status + after_length,
    ))
}

fn bracketed(bytes: &[u8]) -> Option<(&str, usize)> {
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let close = bytes.iter().position(|b| *b == b']')?;
    let inner = std::str::from_utf8(&bytes[1..close]).ok()?;
    Some((inner, close + 1))
}
