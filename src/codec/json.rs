//! JSON payload encoding for client data.
//!
//! JSON has no tag for most of the typed kinds, so the mapping is lossy in
//! one direction: dates become RFC 3339 strings, chars become one-character
//! strings and every number reads back as `Int64` or `Double`.

use bytes::Bytes;
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value as Json};

use crate::codec::value::Value;
use crate::utils::error::{DecodeError, EncodeError};

pub fn to_json(value: &Value) -> Result<Json, EncodeError> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::Bool(*v),
        Value::Byte(v) => Json::from(*v),
        Value::Char(c) => Json::String(c.to_string()),
        Value::Int16(v) => Json::from(*v),
        Value::Int32(v) => Json::from(*v),
        Value::Int64(v) => Json::from(*v),
        Value::Float(v) => float(f64::from(*v))?,
        Value::Double(v) => float(*v)?,
        Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Map(map) => {
            let mut object = Map::with_capacity(map.len());
            for (key, value) in map {
                object.insert(key.clone(), to_json(value)?);
            }
            Json::Object(object)
        }
    })
}

fn float(v: f64) -> Result<Json, EncodeError> {
    Number::from_f64(v)
        .map(Json::Number)
        .ok_or_else(|| EncodeError::UnsupportedType(format!("non-finite number {v}")))
}

pub fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(v) => Value::Bool(v),
        Json::Number(n) => match n.as_i64() {
            Some(v) => Value::Int64(v),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        Json::Object(object) => Value::Map(
            object
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        ),
    }
}

/// Encodes `value` as UTF-8 JSON. `Null` is the empty payload.
pub fn encode(value: &Value) -> Result<Bytes, EncodeError> {
    if value.is_null() {
        return Ok(Bytes::new());
    }
    let json = to_json(value)?;
    Ok(Bytes::from(serde_json::to_vec(&json)?))
}

pub fn decode(data: &[u8]) -> Result<Value, DecodeError> {
    if data.is_empty() {
        return Ok(Value::Null);
    }
    let json: Json = serde_json::from_slice(data)?;
    Ok(from_json(json))
}
