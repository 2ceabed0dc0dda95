//! The `codec` module holds the byte-level formats shared by the broker and
//! its clients: length-prefixed frames, big-endian primitives, and the typed
//! `Value` encoding used for topic data.

pub mod frame;
pub mod json;
pub mod value;
pub(crate) mod wire;

use bytes::Bytes;
use serde::Deserialize;

use crate::utils::error::{DecodeError, EncodeError};

pub use frame::FrameCodec;
pub use value::{Tag, Value};

/// How the data section of `MulticastData`/`UnicastData` is laid out on the
/// wire. Both ends of a connection must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProfile {
    /// `int32` length followed by opaque bytes.
    #[default]
    Raw,
    /// A single inline typed value.
    Structured,
}

/// How a client turns a `Value` into payload bytes and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    #[default]
    Binary,
    Json,
}

impl PayloadEncoding {
    /// `Value::Null` always encodes to an empty payload.
    pub fn encode(&self, value: &Value) -> Result<Bytes, EncodeError> {
        match self {
            PayloadEncoding::Binary if value.is_null() => Ok(Bytes::new()),
            PayloadEncoding::Binary => value.to_bytes(),
            PayloadEncoding::Json => json::encode(value),
        }
    }

    pub fn decode(&self, data: Bytes) -> Result<Value, DecodeError> {
        match self {
            PayloadEncoding::Binary if data.is_empty() => Ok(Value::Null),
            PayloadEncoding::Binary => Value::from_bytes(data),
            PayloadEncoding::Json => json::decode(&data),
        }
    }
}

#[cfg(test)]
mod tests;
