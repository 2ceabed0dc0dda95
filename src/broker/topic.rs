use std::collections::BTreeMap;

use crate::transport::{ConnectionId, WeakConnection};

/// Represents a topic in the subscription manager.
/// Holds the connections subscribed to it, keyed by connection id.
/// Membership is idempotent: subscribing twice leaves one entry.
#[derive(Debug)]
pub struct Topic {
    pub name: String,
    pub subscribers: BTreeMap<ConnectionId, WeakConnection>,
}

impl Topic {
    /// Creates a new instance of the Topic with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: BTreeMap::new(),
        }
    }

    /// Adds the subscriber. Returns false if it was already present.
    pub fn subscribe(&mut self, subscriber: WeakConnection) -> bool {
        self.subscribers.insert(subscriber.id(), subscriber).is_none()
    }

    /// Removes the subscriber. Returns false if it was not present.
    pub fn unsubscribe(&mut self, id: ConnectionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&WeakConnection> {
        self.subscribers.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }
}
