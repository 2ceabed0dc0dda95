//! Events exchanged between the broker and its three managers.
//!
//! Every manager runs as its own task and owns its maps outright; the only
//! way to reach it is to queue one of these events on the [`Bus`].

use std::sync::Arc;

use regex::Regex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

use crate::transport::{
    Connection, ConnectionEvent, ConnectionId, ForwardedSubscriptionRequest, Message,
    MulticastData, UnicastData, WeakConnection,
};

/// Input of the broker worker.
#[derive(Debug)]
pub enum BrokerEvent {
    Accepted(Arc<Connection>),
    Connection(ConnectionEvent),
}

impl From<Arc<Connection>> for BrokerEvent {
    fn from(conn: Arc<Connection>) -> Self {
        BrokerEvent::Accepted(conn)
    }
}

impl From<ConnectionEvent> for BrokerEvent {
    fn from(event: ConnectionEvent) -> Self {
        BrokerEvent::Connection(event)
    }
}

#[derive(Debug)]
pub enum SubscriptionEvent {
    Request {
        subscriber: WeakConnection,
        topic: String,
        is_add: bool,
    },
    Publish {
        publisher: WeakConnection,
        message: MulticastData,
    },
    Unicast {
        publisher: WeakConnection,
        message: UnicastData,
    },
    /// `notifier` registered a pattern it was not already interested in.
    NotificationAdded {
        notifier: WeakConnection,
        pattern: Regex,
    },
    StaleTopics(Vec<String>),
    ConnectionRemoved(ConnectionId),
}

#[derive(Debug)]
pub enum NotificationEvent {
    Request {
        notifier: WeakConnection,
        pattern: String,
        is_add: bool,
    },
    Forwarded(ForwardedSubscriptionRequest),
    ConnectionRemoved(ConnectionId),
}

#[derive(Debug)]
pub enum PublisherEvent {
    Send {
        topic: String,
        publisher: WeakConnection,
        target: WeakConnection,
        message: Message,
    },
    ConnectionRemoved(ConnectionId),
}

/// Sending halves of the manager queues.
#[derive(Debug, Clone)]
pub struct Bus {
    subscriptions: UnboundedSender<SubscriptionEvent>,
    notifications: UnboundedSender<NotificationEvent>,
    publishers: UnboundedSender<PublisherEvent>,
}

/// Receiving halves of the manager queues, one per worker.
#[derive(Debug)]
pub struct BusReceivers {
    pub subscriptions: UnboundedReceiver<SubscriptionEvent>,
    pub notifications: UnboundedReceiver<NotificationEvent>,
    pub publishers: UnboundedReceiver<PublisherEvent>,
}

impl Bus {
    pub fn new() -> (Bus, BusReceivers) {
        let (subscriptions, subscriptions_rx) = unbounded_channel();
        let (notifications, notifications_rx) = unbounded_channel();
        let (publishers, publishers_rx) = unbounded_channel();
        (
            Bus {
                subscriptions,
                notifications,
                publishers,
            },
            BusReceivers {
                subscriptions: subscriptions_rx,
                notifications: notifications_rx,
                publishers: publishers_rx,
            },
        )
    }

    // A closed queue only happens while the server is shutting down.

    pub fn to_subscriptions(&self, event: SubscriptionEvent) {
        if let Err(e) = self.subscriptions.send(event) {
            debug!(event = ?e.0, "subscription manager gone");
        }
    }

    pub fn to_notifications(&self, event: NotificationEvent) {
        if let Err(e) = self.notifications.send(event) {
            debug!(event = ?e.0, "notification manager gone");
        }
    }

    pub fn to_publishers(&self, event: PublisherEvent) {
        if let Err(e) = self.publishers.send(event) {
            debug!(event = ?e.0, "publisher manager gone");
        }
    }
}
