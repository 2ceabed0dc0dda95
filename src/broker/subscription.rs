use std::collections::HashMap;

use regex::Regex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::event::{Bus, NotificationEvent, PublisherEvent, SubscriptionEvent};
use crate::broker::topic::Topic;
use crate::transport::{
    ConnectionId, ForwardedSubscriptionRequest, MulticastData, UnicastData, WeakConnection,
};

/// Owns the topic → subscribers map and routes published data to the
/// subscribers of each topic.
///
/// A topic is present in the map only while it has at least one subscriber.
#[derive(Debug)]
pub struct SubscriptionManager {
    topics: HashMap<String, Topic>,
    bus: Bus,
}

impl SubscriptionManager {
    pub fn new(bus: Bus) -> Self {
        Self {
            topics: HashMap::new(),
            bus,
        }
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<SubscriptionEvent>, shutdown: CancellationToken) {
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
        debug!("subscription manager stopped");
    }

    pub fn handle(&mut self, event: SubscriptionEvent) {
        match event {
            SubscriptionEvent::Request {
                subscriber,
                topic,
                is_add,
            } => {
                if is_add {
                    self.subscribe(&topic, subscriber);
                } else {
                    self.unsubscribe(&topic, subscriber.id());
                }
            }
            SubscriptionEvent::Publish { publisher, message } => self.publish(publisher, message),
            SubscriptionEvent::Unicast { publisher, message } => self.unicast(publisher, message),
            SubscriptionEvent::NotificationAdded { notifier, pattern } => {
                self.replay(&notifier, &pattern)
            }
            SubscriptionEvent::StaleTopics(topics) => self.stale_topics(&topics),
            SubscriptionEvent::ConnectionRemoved(id) => self.remove_connection(id),
        }
    }

    /// Subscribes a connection to a topic, creating the topic if needed.
    pub fn subscribe(&mut self, topic: &str, subscriber: WeakConnection) {
        let id = subscriber.id();
        let added = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(subscriber);
        if added {
            debug!(id, topic, "subscribed");
        } else {
            debug!(id, topic, "already subscribed");
        }
    }

    /// Unsubscribes a connection, pruning the topic once it is empty.
    pub fn unsubscribe(&mut self, topic: &str, id: ConnectionId) {
        let Some(entry) = self.topics.get_mut(topic) else {
            return;
        };
        if entry.unsubscribe(id) {
            debug!(id, topic, "unsubscribed");
        }
        if entry.is_empty() {
            self.topics.remove(topic);
        }
    }

    fn publish(&self, publisher: WeakConnection, message: MulticastData) {
        let Some(topic) = self.topics.get(&message.topic) else {
            debug!(topic = %message.topic, "no subscribers for multicast");
            return;
        };
        for target in topic.subscribers.values() {
            self.bus.to_publishers(PublisherEvent::Send {
                topic: message.topic.clone(),
                publisher: publisher.clone(),
                target: target.clone(),
                message: message.clone().into(),
            });
        }
    }

    fn unicast(&self, publisher: WeakConnection, message: UnicastData) {
        let target = self
            .topics
            .get(&message.topic)
            .and_then(|topic| topic.get(message.client_id))
            .cloned();
        match target {
            Some(target) => self.bus.to_publishers(PublisherEvent::Send {
                topic: message.topic.clone(),
                publisher,
                target,
                message: message.into(),
            }),
            None => debug!(
                client_id = message.client_id,
                topic = %message.topic,
                "unicast target is not subscribed, dropping"
            ),
        }
    }

    /// Tells a new notifier about every current subscription it matches.
    fn replay(&self, notifier: &WeakConnection, pattern: &Regex) {
        for (name, topic) in self.topics.iter().filter(|(name, _)| pattern.is_match(name)) {
            debug!(
                notifier = notifier.id(),
                %pattern,
                topic = %name,
                subscribers = topic.len(),
                "replaying subscriptions"
            );
            for id in topic.subscribers.keys() {
                let notice = ForwardedSubscriptionRequest {
                    client_id: *id,
                    topic: name.clone(),
                    is_add: true,
                };
                if notifier.send(notice).is_err() {
                    debug!(notifier = notifier.id(), "notifier closed during replay");
                    return;
                }
            }
        }
    }

    /// Sends a tombstone to the remaining subscribers of each stale topic.
    fn stale_topics(&self, topics: &[String]) {
        for name in topics {
            let Some(topic) = self.topics.get(name) else {
                continue;
            };
            info!(topic = %name, subscribers = topic.len(), "publisher gone, sending tombstone");
            for subscriber in topic.subscribers.values() {
                if let Err(e) = subscriber.send(MulticastData::tombstone(name.clone())) {
                    debug!(id = subscriber.id(), error = %e, "tombstone not delivered");
                }
            }
        }
    }

    /// Drops every subscription held by `id` and announces each one, then
    /// hands the removal on to the publisher manager.
    fn remove_connection(&mut self, id: ConnectionId) {
        let mut removed = Vec::new();
        self.topics.retain(|name, topic| {
            if topic.unsubscribe(id) {
                removed.push(name.clone());
            }
            !topic.is_empty()
        });

        if !removed.is_empty() {
            debug!(id, topics = ?removed, "removed subscriptions");
        }
        for topic in removed {
            self.bus
                .to_notifications(NotificationEvent::Forwarded(ForwardedSubscriptionRequest {
                    client_id: id,
                    topic,
                    is_add: false,
                }));
        }

        // queued after every send already routed for this publisher
        self.bus.to_publishers(PublisherEvent::ConnectionRemoved(id));
    }

    pub fn subscribers(&self, topic: &str) -> Vec<ConnectionId> {
        self.topics
            .get(topic)
            .map(|t| t.subscribers.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
