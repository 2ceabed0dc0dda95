//! # TopicBus
//!
//! `topicbus` is an in-memory, topic-based publish/subscribe broker speaking
//! a small length-prefixed binary protocol over TCP, together with the
//! client library for it.
//!
//! ## Core Modules
//!
//! - `broker`: the routing engine and its subscription, notification and publisher managers.
//! - `client`: the client connection and the caching publisher built on it.
//! - `codec`: frames, big-endian primitives and the typed `Value` encoding.
//! - `config`: loading `Settings` from files and the environment.
//! - `transport`: protocol messages, connections and the acceptor.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod transport;
pub mod utils;

pub use broker::Server;
pub use client::{CachingPublisher, Client, ClientEvent, ClientEvents};
pub use codec::{PayloadEncoding, Value, WireProfile};
pub use config::{Settings, load_config};
