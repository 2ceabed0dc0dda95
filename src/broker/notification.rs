use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broker::event::{Bus, NotificationEvent, SubscriptionEvent};
use crate::transport::{ConnectionId, ForwardedSubscriptionRequest, WeakConnection};
use crate::utils::error::BrokerError;

#[derive(Debug)]
struct Notification {
    regex: Regex,
    notifiers: BTreeMap<ConnectionId, WeakConnection>,
}

/// Owns the pattern → notifier map and fans subscription changes out to
/// every connection whose pattern matches the topic.
#[derive(Debug)]
pub struct NotificationManager {
    patterns: HashMap<String, Notification>,
    bus: Bus,
}

impl NotificationManager {
    pub fn new(bus: Bus) -> Self {
        Self {
            patterns: HashMap::new(),
            bus,
        }
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<NotificationEvent>, shutdown: CancellationToken) {
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
        debug!("notification manager stopped");
    }

    pub fn handle(&mut self, event: NotificationEvent) {
        match event {
            NotificationEvent::Request {
                notifier,
                pattern,
                is_add,
            } => {
                if is_add {
                    if let Err(e) = self.add(notifier.clone(), &pattern) {
                        warn!(id = notifier.id(), error = %e, "notification request rejected");
                    }
                } else {
                    self.remove(notifier.id(), &pattern);
                }
            }
            NotificationEvent::Forwarded(notice) => self.forward(notice),
            NotificationEvent::ConnectionRemoved(id) => self.remove_connection(id),
        }
    }

    /// Registers interest in `pattern`. A connection new to the pattern gets
    /// the existing matching subscriptions replayed to it.
    pub fn add(&mut self, notifier: WeakConnection, pattern: &str) -> Result<(), BrokerError> {
        let notification = match self.patterns.entry(pattern.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let regex = Regex::new(pattern).map_err(|source| BrokerError::BadPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
                entry.insert(Notification {
                    regex,
                    notifiers: BTreeMap::new(),
                })
            }
        };

        let id = notifier.id();
        if notification.notifiers.contains_key(&id) {
            debug!(id, pattern, "already notified");
            return Ok(());
        }
        notification.notifiers.insert(id, notifier.clone());
        debug!(id, pattern, "notification added");

        self.bus.to_subscriptions(SubscriptionEvent::NotificationAdded {
            notifier,
            pattern: notification.regex.clone(),
        });
        Ok(())
    }

    pub fn remove(&mut self, id: ConnectionId, pattern: &str) {
        let Some(notification) = self.patterns.get_mut(pattern) else {
            return;
        };
        if notification.notifiers.remove(&id).is_some() {
            debug!(id, pattern, "notification removed");
        }
        if notification.notifiers.is_empty() {
            self.patterns.remove(pattern);
        }
    }

    fn forward(&self, notice: ForwardedSubscriptionRequest) {
        let notifiers: BTreeMap<ConnectionId, &WeakConnection> = self
            .patterns
            .values()
            .filter(|n| n.regex.is_match(&notice.topic))
            .flat_map(|n| n.notifiers.iter().map(|(id, conn)| (*id, conn)))
            .collect();

        if notifiers.is_empty() {
            return;
        }
        debug!(
            notifiers = ?notifiers.keys().collect::<Vec<_>>(),
            client_id = notice.client_id,
            topic = %notice.topic,
            is_add = notice.is_add,
            "forwarding subscription change"
        );
        for notifier in notifiers.values() {
            if let Err(e) = notifier.send(notice.clone()) {
                debug!(id = notifier.id(), error = %e, "notice not delivered");
            }
        }
    }

    fn remove_connection(&mut self, id: ConnectionId) {
        self.patterns.retain(|pattern, notification| {
            if notification.notifiers.remove(&id).is_some() {
                debug!(id, pattern, "notification dropped with connection");
            }
            !notification.notifiers.is_empty()
        });
    }

    pub fn notifiers(&self, pattern: &str) -> Vec<ConnectionId> {
        self.patterns
            .get(pattern)
            .map(|n| n.notifiers.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}
