use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use chrono::{TimeZone, Utc};
use tokio_util::codec::{Decoder, Encoder};

use super::wire::{Decode, Encode};
use super::{FrameCodec, PayloadEncoding, Value};
use crate::utils::error::{DecodeError, EncodeError};

fn round_trip(value: &Value) -> Value {
    Value::from_bytes(value.to_bytes().unwrap()).unwrap()
}

#[test]
fn test_every_tag_round_trips() {
    let date = Utc.with_ymd_and_hms(2015, 6, 1, 12, 30, 15).unwrap()
        + chrono::Duration::milliseconds(250);

    let values = vec![
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Byte(0xfe),
        Value::Char('é'),
        Value::Int16(-12_345),
        Value::Int32(i32::MIN),
        Value::Int64(i64::MAX),
        Value::Float(1.5),
        Value::Double(140.65),
        Value::Date(date),
        Value::String("LSE.VOD £".to_string()),
        Value::Array(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]),
        Value::Map(HashMap::from([("bid".to_string(), Value::Double(100.25))])),
    ];

    for value in &values {
        assert_eq!(&round_trip(value), value, "round trip of {value}");
    }
}

#[test]
fn test_map_with_nested_array_and_map() {
    let inner: Value = [
        ("venue".to_string(), Value::from("LSE")),
        ("open".to_string(), Value::from(true)),
    ]
    .into_iter()
    .collect();

    let value: Value = [
        ("name".to_string(), Value::from("Vodafone")),
        (
            "trades".to_string(),
            Value::Array(vec![Value::from(10i64), Value::from(20i64)]),
        ),
        ("market".to_string(), inner),
        ("empty".to_string(), Value::Array(vec![])),
    ]
    .into_iter()
    .collect();

    assert_eq!(round_trip(&value), value);
}

#[test]
fn test_tag_bytes_are_fixed() {
    assert_eq!(&Value::Null.to_bytes().unwrap()[..], &[0]);
    assert_eq!(&Value::Bool(true).to_bytes().unwrap()[..], &[1, 1]);
    assert_eq!(&Value::Char('A').to_bytes().unwrap()[..], &[3, 0, 0x41]);
    assert_eq!(&Value::Int32(1).to_bytes().unwrap()[..], &[5, 0, 0, 0, 1]);
    assert_eq!(
        &Value::String("hi".into()).to_bytes().unwrap()[..],
        &[10, 0, 0, 0, 2, b'h', b'i']
    );
    assert_eq!(
        &Value::Array(vec![Value::Byte(7)]).to_bytes().unwrap()[..],
        &[11, 0, 0, 0, 1, 2, 7]
    );
}

#[test]
fn test_date_is_millis_since_epoch() {
    let date = Utc.timestamp_millis_opt(1_000).unwrap();
    assert_eq!(
        &Value::Date(date).to_bytes().unwrap()[..],
        &[9, 0, 0, 0, 0, 0, 0, 0x03, 0xe8]
    );
}

#[test]
fn test_unsupported_tag() {
    let err = Value::from_bytes(Bytes::from_static(&[42])).unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedTag(42)));
}

#[test]
fn test_char_outside_bmp_is_unsupported() {
    let err = Value::Char('🦀').to_bytes().unwrap_err();
    assert!(matches!(err, EncodeError::UnsupportedType(_)));
}

#[test]
fn test_surrogate_code_unit_is_rejected() {
    let err = Value::from_bytes(Bytes::from_static(&[3, 0xd8, 0x00])).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidChar(0xd800)));
}

#[test]
fn test_mixed_array_is_unsupported() {
    let value = Value::Array(vec![Value::Int32(1), Value::from("two")]);
    assert!(matches!(
        value.to_bytes(),
        Err(EncodeError::UnsupportedType(_))
    ));

    // nulls may sit among values of one type
    let value = Value::Array(vec![Value::Int32(1), Value::Null, Value::Int32(3)]);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let err = Value::from_bytes(Bytes::from_static(&[0, 0])).unwrap_err();
    assert!(matches!(err, DecodeError::TrailingBytes(1)));
}

#[test]
fn test_array_count_beyond_input_is_truncated() {
    let err = Value::from_bytes(Bytes::from_static(&[11, 0x7f, 0xff, 0xff, 0xff])).unwrap_err();
    assert!(matches!(err, DecodeError::Truncated));
}

#[test]
fn test_deep_nesting_is_rejected() {
    let mut raw = Vec::new();
    for _ in 0..=super::value::MAX_DEPTH {
        raw.extend_from_slice(&[11, 0, 0, 0, 1]);
    }
    raw.push(0);
    let err = Value::from_bytes(Bytes::from(raw)).unwrap_err();
    assert!(matches!(err, DecodeError::NestingTooDeep(_)));
}

#[test]
fn test_encoded_size_matches_output() {
    let value: Value = [
        ("a".to_string(), Value::Int16(1)),
        ("b".to_string(), Value::Array(vec![Value::Double(2.0)])),
    ]
    .into_iter()
    .collect();
    assert_eq!(value.encoded_size(), value.to_bytes().unwrap().len());
}

#[test]
fn test_value_decode_consumes_only_its_extent() {
    let mut buf = BytesMut::new();
    Value::Int16(7).encode(&mut buf).unwrap();
    buf.extend_from_slice(b"rest");
    let mut src = buf.freeze();
    assert_eq!(Value::decode(&mut src).unwrap(), Value::Int16(7));
    assert_eq!(&src[..], b"rest");
}

#[test]
fn test_frame_codec_round_trip() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(Bytes::from_static(b"abc"), &mut buf).unwrap();
    codec.encode(Bytes::new(), &mut buf).unwrap();
    assert_eq!(&buf[..4], &[0, 0, 0, 3]);

    assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Bytes::from_static(b"abc"));
    assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Bytes::new());
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn test_frame_codec_waits_for_partial_input() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(&[0u8, 0, 0][..]);
    assert!(codec.decode(&mut buf).unwrap().is_none());

    buf.extend_from_slice(&[2, b'x']);
    assert!(codec.decode(&mut buf).unwrap().is_none());

    buf.extend_from_slice(b"y");
    assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Bytes::from_static(b"xy"));
}

#[test]
fn test_frame_codec_end_of_stream_mid_frame() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(&[0u8, 0, 0, 4, 1][..]);
    assert!(matches!(
        codec.decode_eof(&mut buf),
        Err(DecodeError::EndOfStream)
    ));

    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    assert!(codec.decode_eof(&mut buf).unwrap().is_none());
}

#[test]
fn test_frame_codec_rejects_bad_lengths() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(&[0xffu8, 0xff, 0xff, 0xff][..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(DecodeError::InvalidLength(-1))
    ));

    let mut codec = FrameCodec::with_max_size(8);
    assert_eq!(codec.max_size(), 8);
    let mut buf = BytesMut::from(&[0u8, 0, 0, 9][..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(DecodeError::FrameTooLarge { size: 9, max: 8 })
    ));
}

#[test]
fn test_frame_codec_does_not_trust_announced_length() {
    let mut codec = FrameCodec::new();
    assert_eq!(codec.max_size(), 0);

    // announces a 1 GiB body but sends only a few bytes of it
    let mut buf = BytesMut::from(&[0x40u8, 0, 0, 0, 1, 2, 3][..]);
    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert!(buf.capacity() < 1024 * 1024);
    assert!(matches!(
        codec.decode_eof(&mut buf),
        Err(DecodeError::EndOfStream)
    ));
}

#[test]
fn test_binary_payload_encoding() {
    let encoding = PayloadEncoding::Binary;
    assert!(encoding.encode(&Value::Null).unwrap().is_empty());
    assert_eq!(encoding.decode(Bytes::new()).unwrap(), Value::Null);

    let value = Value::from("hello");
    let data = encoding.encode(&value).unwrap();
    assert_eq!(encoding.decode(data).unwrap(), value);
}

#[test]
fn test_json_payload_encoding() {
    let encoding = PayloadEncoding::Json;
    let value: Value = [
        ("price".to_string(), Value::Double(1.5)),
        ("size".to_string(), Value::Int32(100)),
        ("side".to_string(), Value::Char('B')),
        (
            "at".to_string(),
            Value::Date(Utc.timestamp_millis_opt(1_500).unwrap()),
        ),
    ]
    .into_iter()
    .collect();

    let data = encoding.encode(&value).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&data).unwrap();
    assert_eq!(json["side"], "B");
    assert_eq!(json["at"], "1970-01-01T00:00:01.500Z");

    let decoded = encoding.decode(data).unwrap();
    let map = decoded.as_map().unwrap();
    assert_eq!(map["price"], Value::Double(1.5));
    assert_eq!(map["size"], Value::Int64(100));

    assert!(encoding.encode(&Value::Null).unwrap().is_empty());
    assert_eq!(encoding.decode(Bytes::new()).unwrap(), Value::Null);
    assert!(matches!(
        encoding.decode(Bytes::from_static(b"{not json")),
        Err(DecodeError::Json(_))
    ));
}
