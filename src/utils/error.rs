//! The `error` module defines the error types used across `topicbus`.
//!
//! Errors are split by the layer that raises them: the wire codec
//! (`DecodeError`/`EncodeError`), a single connection (`TransportError`) and
//! the broker process (`BrokerError`). Connection-level errors only ever end
//! the connection that produced them.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The peer closed the stream before a frame was complete.
    #[error("end of stream")]
    EndOfStream,
    /// A frame ended before every field of its message was read.
    #[error("message truncated")]
    Truncated,
    #[error("unsupported value tag {0}")]
    UnsupportedTag(u8),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("invalid length {0}")]
    InvalidLength(i32),
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },
    #[error("invalid utf-8 in string")]
    InvalidUtf8,
    #[error("invalid char code unit {0:#06x}")]
    InvalidChar(u16),
    #[error("invalid date {0} ms since epoch")]
    InvalidDate(i64),
    #[error("values nested deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("{0} unread bytes after message")]
    TrailingBytes(usize),
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error, {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("{0} bytes do not fit in an int32 length")]
    TooLarge(usize),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error, {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("decoding error: {0}")]
    Decode(#[from] DecodeError),
    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),
    #[error("io error, {0}")]
    Io(#[from] io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    /// The connection is closed and its writer no longer accepts messages.
    #[error("connection is closed")]
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("accept loop failed: {0}")]
    Accept(io::Error),
    #[error("no connection ids left")]
    IdsExhausted,
    #[error("invalid notification pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BrokerError {
    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        BrokerError::Bind {
            addr: addr.into(),
            source,
        }
    }
}

impl TransportError {
    pub(crate) fn connect(addr: impl Into<String>, source: io::Error) -> Self {
        TransportError::Connect {
            addr: addr.into(),
            source,
        }
    }
}
