//! The `transport` module is responsible for network communication between
//! the broker and its clients over TCP.
//!
//! It defines the five protocol messages and their framing, the
//! `Connection` type wrapping one socket (a read loop plus a single writer
//! task), and the `Acceptor` that produces new connections.

pub mod acceptor;
pub mod connection;
pub mod message;

pub use acceptor::Acceptor;
pub use connection::{Connection, ConnectionEvent, ConnectionId, PendingReader, WeakConnection};
pub use message::{
    ClientId, ForwardedSubscriptionRequest, Message, MessageCodec, MessageType, MulticastData,
    NotificationRequest, SubscriptionRequest, UnicastData,
};
