use std::collections::{BTreeSet, HashMap};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broker::event::{Bus, PublisherEvent, SubscriptionEvent};
use crate::transport::{ConnectionId, Message, WeakConnection};

/// Remembers who publishes on which topic, so that a departing publisher
/// yields the topics nobody publishes on any more, and performs the final
/// send of routed data.
#[derive(Debug)]
pub struct PublisherManager {
    topic_publishers: HashMap<String, BTreeSet<ConnectionId>>,
    publisher_topics: HashMap<ConnectionId, BTreeSet<String>>,
    bus: Bus,
}

impl PublisherManager {
    pub fn new(bus: Bus) -> Self {
        Self {
            topic_publishers: HashMap::new(),
            publisher_topics: HashMap::new(),
            bus,
        }
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<PublisherEvent>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        debug!("publisher manager stopped");
    }

    pub fn handle(&mut self, event: PublisherEvent) {
        match event {
            PublisherEvent::Send {
                topic,
                publisher,
                target,
                message,
            } => self.record_and_send(topic, &publisher, &target, message),
            PublisherEvent::ConnectionRemoved(id) => {
                let stale = self.remove_connection(id);
                if !stale.is_empty() {
                    self.bus.to_subscriptions(SubscriptionEvent::StaleTopics(stale));
                }
            }
        }
    }

    fn record_and_send(&mut self, topic: String, publisher: &WeakConnection, target: &WeakConnection, message: Message) {
        self.remember(topic, publisher.id());

        let Some(conn) = target.upgrade() else {
            debug!(target = target.id(), "target already removed");
            return;
        };
        if let Err(e) = conn.send(message) {
            warn!(target = %conn, error = %e, "send failed, closing target");
            conn.close();
        }
    }

    fn remember(&mut self, topic: String, publisher: ConnectionId) {
        self.publisher_topics
            .entry(publisher)
            .or_default()
            .insert(topic.clone());
        self.topic_publishers.entry(topic).or_default().insert(publisher);
    }

    /// Forgets `id` as a publisher and returns the topics left without one.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Vec<String> {
        let Some(topics) = self.publisher_topics.remove(&id) else {
            return Vec::new();
        };

        let mut stale = Vec::new();
        for topic in topics {
            let Some(publishers) = self.topic_publishers.get_mut(&topic) else {
                continue;
            };
            publishers.remove(&id);
            if publishers.is_empty() {
                self.topic_publishers.remove(&topic);
                stale.push(topic);
            }
        }
        if !stale.is_empty() {
            debug!(id, topics = ?stale, "stale topics");
        }
        stale
    }

    pub fn publishers(&self, topic: &str) -> Vec<ConnectionId> {
        self.topic_publishers
            .get(topic)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }
}
