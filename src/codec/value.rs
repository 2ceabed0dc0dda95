//! Typed values
//!
//! `Value` is the closed set of payload types the bus can carry. On the wire
//! every value starts with one tag byte followed by the type-specific bytes:
//!
//! | tag | type    | body                                          |
//! |-----|---------|-----------------------------------------------|
//! | 0   | null    | -                                             |
//! | 1   | bool    | 1 byte                                        |
//! | 2   | byte    | 1 byte                                        |
//! | 3   | char    | 2 bytes, UTF-16 code unit                     |
//! | 4   | int16   | 2 bytes                                       |
//! | 5   | int32   | 4 bytes                                       |
//! | 6   | int64   | 8 bytes                                       |
//! | 7   | float32 | 4 bytes, IEEE 754                             |
//! | 8   | float64 | 8 bytes, int64 bit pattern                    |
//! | 9   | date    | int64 milliseconds since the Unix epoch       |
//! | 10  | string  | int32 length + UTF-8 bytes                    |
//! | 11  | array   | int32 count + tagged elements                 |
//! | 12  | map     | int32 count + (string key, tagged value) pairs |
//!
//! All multi-byte integers are big-endian.

use std::collections::HashMap;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::codec::wire::{Decode, Encode, decode_length, encode_length, ensure};
use crate::utils::error::{DecodeError, EncodeError};

/// Arrays and maps nested deeper than this are rejected on decode.
pub const MAX_DEPTH: usize = 64;

#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum Tag {
    Null = 0,
    Bool = 1,
    Byte = 2,
    Char = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    Float = 7,
    Double = 8,
    Date = 9,
    String = 10,
    Array = 11,
    Map = 12,
}

impl TryFrom<u8> for Tag {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Tag::Null,
            1 => Tag::Bool,
            2 => Tag::Byte,
            3 => Tag::Char,
            4 => Tag::Int16,
            5 => Tag::Int32,
            6 => Tag::Int64,
            7 => Tag::Float,
            8 => Tag::Double,
            9 => Tag::Date,
            10 => Tag::String,
            11 => Tag::Array,
            12 => Tag::Map,
            other => return Err(DecodeError::UnsupportedTag(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Char(char),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Date(DateTime<Utc>),
    String(String),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Null => Tag::Null,
            Value::Bool(_) => Tag::Bool,
            Value::Byte(_) => Tag::Byte,
            Value::Char(_) => Tag::Char,
            Value::Int16(_) => Tag::Int16,
            Value::Int32(_) => Tag::Int32,
            Value::Int64(_) => Tag::Int64,
            Value::Float(_) => Tag::Float,
            Value::Double(_) => Tag::Double,
            Value::Date(_) => Tag::Date,
            Value::String(_) => Tag::String,
            Value::Array(_) => Tag::Array,
            Value::Map(_) => Tag::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Encodes the value into a standalone buffer.
    pub fn to_bytes(&self) -> Result<Bytes, EncodeError> {
        let mut dst = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Decodes exactly one value; bytes left over after it are an error.
    pub fn from_bytes(mut src: Bytes) -> Result<Value, DecodeError> {
        let value = Value::decode(&mut src)?;
        ensure!(src.is_empty(), DecodeError::TrailingBytes(src.len()));
        Ok(value)
    }

    fn decode_nested(src: &mut Bytes, depth: usize) -> Result<Value, DecodeError> {
        ensure!(depth <= MAX_DEPTH, DecodeError::NestingTooDeep(MAX_DEPTH));

        let tag = Tag::try_from(u8::decode(src)?)?;
        let value = match tag {
            Tag::Null => Value::Null,
            Tag::Bool => Value::Bool(bool::decode(src)?),
            Tag::Byte => Value::Byte(u8::decode(src)?),
            Tag::Char => {
                let unit = u16::decode(src)?;
                let c = char::from_u32(u32::from(unit)).ok_or(DecodeError::InvalidChar(unit))?;
                Value::Char(c)
            }
            Tag::Int16 => Value::Int16(i16::decode(src)?),
            Tag::Int32 => Value::Int32(i32::decode(src)?),
            Tag::Int64 => Value::Int64(i64::decode(src)?),
            Tag::Float => Value::Float(f32::decode(src)?),
            Tag::Double => Value::Double(f64::decode(src)?),
            Tag::Date => {
                let millis = i64::decode(src)?;
                let date = DateTime::from_timestamp_millis(millis)
                    .ok_or(DecodeError::InvalidDate(millis))?;
                Value::Date(date)
            }
            Tag::String => Value::String(String::decode(src)?),
            Tag::Array => {
                let count = decode_length(src)?;
                // every element needs at least its tag byte
                ensure!(src.remaining() >= count, DecodeError::Truncated);
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Value::decode_nested(src, depth + 1)?);
                }
                Value::Array(items)
            }
            Tag::Map => {
                let count = decode_length(src)?;
                // a key length plus a value tag per entry
                ensure!(src.remaining() >= count.saturating_mul(5), DecodeError::Truncated);
                let mut map = HashMap::with_capacity(count);
                for _ in 0..count {
                    let key = String::decode(src)?;
                    let value = Value::decode_nested(src, depth + 1)?;
                    map.insert(key, value);
                }
                Value::Map(map)
            }
        };
        Ok(value)
    }
}

impl Decode for Value {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        Value::decode_nested(src, 0)
    }
}

impl Encode for Value {
    fn encoded_size(&self) -> usize {
        1 + match self {
            Value::Null => 0,
            Value::Bool(_) | Value::Byte(_) => 1,
            Value::Char(_) | Value::Int16(_) => 2,
            Value::Int32(_) | Value::Float(_) => 4,
            Value::Int64(_) | Value::Double(_) | Value::Date(_) => 8,
            Value::String(s) => s.encoded_size(),
            Value::Array(items) => 4 + items.iter().map(Encode::encoded_size).sum::<usize>(),
            Value::Map(map) => {
                4 + map
                    .iter()
                    .map(|(k, v)| k.encoded_size() + v.encoded_size())
                    .sum::<usize>()
            }
        }
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u8(self.tag() as u8);
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => v.encode(dst),
            Value::Byte(v) => v.encode(dst),
            Value::Char(c) => {
                let unit = u16::try_from(u32::from(*c)).map_err(|_| {
                    EncodeError::UnsupportedType(format!(
                        "char {c:?} is outside the basic multilingual plane"
                    ))
                })?;
                unit.encode(dst)
            }
            Value::Int16(v) => v.encode(dst),
            Value::Int32(v) => v.encode(dst),
            Value::Int64(v) => v.encode(dst),
            Value::Float(v) => v.encode(dst),
            Value::Double(v) => v.encode(dst),
            Value::Date(d) => d.timestamp_millis().encode(dst),
            Value::String(s) => s.encode(dst),
            Value::Array(items) => {
                ensure_homogeneous(items)?;
                encode_length(items.len(), dst)?;
                items.iter().try_for_each(|item| item.encode(dst))
            }
            Value::Map(map) => {
                encode_length(map.len(), dst)?;
                for (key, value) in map {
                    key.encode(dst)?;
                    value.encode(dst)?;
                }
                Ok(())
            }
        }
    }
}

fn ensure_homogeneous(items: &[Value]) -> Result<(), EncodeError> {
    let mut tags = items.iter().filter(|v| !v.is_null()).map(Value::tag);
    if let Some(first) = tags.next() {
        if let Some(other) = tags.find(|t| *t != first) {
            return Err(EncodeError::UnsupportedType(format!(
                "array mixes {first:?} and {other:?} elements"
            )));
        }
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v:?}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {}", map[key])?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! from_scalar {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

from_scalar! {
    bool => Bool,
    u8 => Byte,
    char => Char,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    DateTime<Utc> => Date,
    String => String,
    Vec<Value> => Array,
    HashMap<String, Value> => Map,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<V: Into<Value>> FromIterator<(String, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
