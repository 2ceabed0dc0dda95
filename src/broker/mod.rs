//! The routing core.
//!
//! `Broker` owns the live connections and dispatches their messages; the
//! subscription, notification and publisher managers each own one map and
//! run as their own serialized worker, talking over the [`event::Bus`].

pub mod engine;
pub mod event;
pub mod notification;
pub mod publisher;
pub mod server;
pub mod subscription;
pub mod topic;

pub use engine::Broker;
pub use server::Server;
