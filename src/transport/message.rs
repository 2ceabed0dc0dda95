use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::wire::{Decode, Encode, ensure};
use crate::codec::{FrameCodec, Tag, Value, WireProfile};
use crate::utils::error::{DecodeError, EncodeError};

/// Connection ids travel on the wire as `int32`.
pub type ClientId = i32;

/// One-byte discriminator at the start of every message.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum MessageType {
    MulticastData = 0,
    UnicastData = 1,
    ForwardedSubscriptionRequest = 2,
    NotificationRequest = 3,
    SubscriptionRequest = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(MessageType::MulticastData),
            1 => Ok(MessageType::UnicastData),
            2 => Ok(MessageType::ForwardedSubscriptionRequest),
            3 => Ok(MessageType::NotificationRequest),
            4 => Ok(MessageType::SubscriptionRequest),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub topic: String,
    pub is_add: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub pattern: String,
    pub is_add: bool,
}

/// Tells a notifier that `client_id` started or stopped subscribing to
/// `topic`. Only ever sent by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedSubscriptionRequest {
    pub client_id: ClientId,
    pub topic: String,
    pub is_add: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastData {
    pub topic: String,
    pub is_image: bool,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastData {
    pub client_id: ClientId,
    pub topic: String,
    pub is_image: bool,
    pub data: Bytes,
}

impl MulticastData {
    /// An empty image, sent when the last publisher of a topic goes away.
    pub fn tombstone(topic: impl Into<String>) -> Self {
        MulticastData {
            topic: topic.into(),
            is_image: true,
            data: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    MulticastData(MulticastData),
    UnicastData(UnicastData),
    ForwardedSubscriptionRequest(ForwardedSubscriptionRequest),
    NotificationRequest(NotificationRequest),
    SubscriptionRequest(SubscriptionRequest),
}

macro_rules! impl_from_message {
    ($($variant:ident),+) => {
        $(
            impl From<$variant> for Message {
                fn from(v: $variant) -> Self {
                    Message::$variant(v)
                }
            }
        )+
    };
}

impl_from_message!(
    MulticastData,
    UnicastData,
    ForwardedSubscriptionRequest,
    NotificationRequest,
    SubscriptionRequest
);

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::MulticastData(_) => MessageType::MulticastData,
            Message::UnicastData(_) => MessageType::UnicastData,
            Message::ForwardedSubscriptionRequest(_) => MessageType::ForwardedSubscriptionRequest,
            Message::NotificationRequest(_) => MessageType::NotificationRequest,
            Message::SubscriptionRequest(_) => MessageType::SubscriptionRequest,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Message::MulticastData(m) => &m.topic,
            Message::UnicastData(m) => &m.topic,
            Message::ForwardedSubscriptionRequest(m) => &m.topic,
            Message::NotificationRequest(m) => &m.pattern,
            Message::SubscriptionRequest(m) => &m.topic,
        }
    }

    /// Parses one message from a complete frame body.
    pub fn read(mut src: Bytes, profile: WireProfile) -> Result<Message, DecodeError> {
        let message_type = MessageType::try_from(u8::decode(&mut src)?)?;
        let message = match message_type {
            MessageType::MulticastData => Message::MulticastData(MulticastData {
                topic: String::decode(&mut src)?,
                is_image: bool::decode(&mut src)?,
                data: read_data(&mut src, profile)?,
            }),
            MessageType::UnicastData => Message::UnicastData(UnicastData {
                client_id: i32::decode(&mut src)?,
                topic: String::decode(&mut src)?,
                is_image: bool::decode(&mut src)?,
                data: read_data(&mut src, profile)?,
            }),
            MessageType::ForwardedSubscriptionRequest => {
                Message::ForwardedSubscriptionRequest(ForwardedSubscriptionRequest {
                    client_id: i32::decode(&mut src)?,
                    topic: String::decode(&mut src)?,
                    is_add: bool::decode(&mut src)?,
                })
            }
            MessageType::NotificationRequest => Message::NotificationRequest(NotificationRequest {
                pattern: String::decode(&mut src)?,
                is_add: bool::decode(&mut src)?,
            }),
            MessageType::SubscriptionRequest => Message::SubscriptionRequest(SubscriptionRequest {
                topic: String::decode(&mut src)?,
                is_add: bool::decode(&mut src)?,
            }),
        };
        ensure!(src.is_empty(), DecodeError::TrailingBytes(src.len()));
        Ok(message)
    }

    pub fn write(&self, dst: &mut BytesMut, profile: WireProfile) -> Result<(), EncodeError> {
        dst.put_u8(self.message_type() as u8);
        match self {
            Message::MulticastData(m) => {
                m.topic.encode(dst)?;
                m.is_image.encode(dst)?;
                write_data(&m.data, dst, profile)
            }
            Message::UnicastData(m) => {
                m.client_id.encode(dst)?;
                m.topic.encode(dst)?;
                m.is_image.encode(dst)?;
                write_data(&m.data, dst, profile)
            }
            Message::ForwardedSubscriptionRequest(m) => {
                m.client_id.encode(dst)?;
                m.topic.encode(dst)?;
                m.is_add.encode(dst)
            }
            Message::NotificationRequest(m) => {
                m.pattern.encode(dst)?;
                m.is_add.encode(dst)
            }
            Message::SubscriptionRequest(m) => {
                m.topic.encode(dst)?;
                m.is_add.encode(dst)
            }
        }
    }

    /// Upper bound on the bytes `write` produces.
    pub fn encoded_size(&self) -> usize {
        1 + match self {
            Message::MulticastData(m) => m.topic.encoded_size() + 1 + 4 + m.data.len(),
            Message::UnicastData(m) => 4 + m.topic.encoded_size() + 1 + 4 + m.data.len(),
            Message::ForwardedSubscriptionRequest(m) => 4 + m.topic.encoded_size() + 1,
            Message::NotificationRequest(m) => m.pattern.encoded_size() + 1,
            Message::SubscriptionRequest(m) => m.topic.encoded_size() + 1,
        }
    }
}

fn read_data(src: &mut Bytes, profile: WireProfile) -> Result<Bytes, DecodeError> {
    match profile {
        WireProfile::Raw => Bytes::decode(src),
        WireProfile::Structured => {
            let mut probe = src.clone();
            let value = Value::decode(&mut probe)?;
            let raw = src.split_to(src.len() - probe.len());
            Ok(if value.is_null() { Bytes::new() } else { raw })
        }
    }
}

fn write_data(data: &Bytes, dst: &mut BytesMut, profile: WireProfile) -> Result<(), EncodeError> {
    match profile {
        WireProfile::Raw => data.encode(dst),
        WireProfile::Structured if data.is_empty() => {
            dst.put_u8(Tag::Null as u8);
            Ok(())
        }
        WireProfile::Structured => {
            if Value::from_bytes(data.clone()).is_err() {
                return Err(EncodeError::UnsupportedType(
                    "structured payload must be exactly one typed value".to_string(),
                ));
            }
            dst.put_slice(data);
            Ok(())
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::MulticastData(m) => write!(
                f,
                "MulticastData(topic={:?}, is_image={}, {} bytes)",
                m.topic,
                m.is_image,
                m.data.len()
            ),
            Message::UnicastData(m) => write!(
                f,
                "UnicastData(client_id={}, topic={:?}, is_image={}, {} bytes)",
                m.client_id,
                m.topic,
                m.is_image,
                m.data.len()
            ),
            Message::ForwardedSubscriptionRequest(m) => write!(
                f,
                "ForwardedSubscriptionRequest(client_id={}, topic={:?}, is_add={})",
                m.client_id, m.topic, m.is_add
            ),
            Message::NotificationRequest(m) => write!(
                f,
                "NotificationRequest(pattern={:?}, is_add={})",
                m.pattern, m.is_add
            ),
            Message::SubscriptionRequest(m) => write!(
                f,
                "SubscriptionRequest(topic={:?}, is_add={})",
                m.topic, m.is_add
            ),
        }
    }
}

/// Frames and parses protocol messages for one side of a connection.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    frames: FrameCodec,
    profile: WireProfile,
}

impl MessageCodec {
    pub fn new(profile: WireProfile, max_frame_size: usize) -> Self {
        MessageCodec {
            frames: FrameCodec::with_max_size(max_frame_size),
            profile,
        }
    }

    pub fn profile(&self) -> WireProfile {
        self.profile
    }

    /// Zero means unlimited.
    pub fn max_frame_size(&self) -> usize {
        self.frames.max_size()
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        MessageCodec::new(WireProfile::default(), 0)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode(src)? {
            Some(frame) => Message::read(frame, self.profile).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode_eof(src)? {
            Some(frame) => Message::read(frame, self.profile).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = EncodeError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::with_capacity(item.encoded_size());
        item.write(&mut body, self.profile)?;
        self.frames.encode(body.freeze(), dst)
    }
}
