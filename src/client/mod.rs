//! The `client` module is the library side of the protocol.
//!
//! `Client` connects to a broker and exposes the subscribe, publish and
//! notification requests; `ClientEvents` yields what the broker sends back.
//! `CachingPublisher` layers an image cache on top for publishers that need
//! to bring late subscribers up to date.

pub mod caching;
pub mod pubsub_client;

pub use caching::{CachingEvents, CachingPublisher};
pub use pubsub_client::{Client, ClientEvent, ClientEvents};

#[cfg(test)]
mod tests;
