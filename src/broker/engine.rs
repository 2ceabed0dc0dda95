use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::event::{
    BrokerEvent, Bus, NotificationEvent, SubscriptionEvent,
};
use crate::transport::{
    Connection, ConnectionEvent, ConnectionId, ForwardedSubscriptionRequest, Message,
};

/// Represents the broker that owns every live connection.
/// Each inbound message is dispatched by type to one of the managers, and
/// every manager is told exactly once when a connection goes away.
#[derive(Debug)]
pub struct Broker {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    bus: Bus,
}

impl Broker {
    pub fn new(bus: Bus) -> Self {
        Self {
            connections: HashMap::new(),
            bus,
        }
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<BrokerEvent>, shutdown: CancellationToken) {
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
        self.close_all();
    }

    pub fn handle(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Accepted(conn) => self.register(conn),
            BrokerEvent::Connection(ConnectionEvent::Received { id, message }) => {
                self.dispatch(id, message)
            }
            BrokerEvent::Connection(ConnectionEvent::Closed { id, abnormal }) => {
                if abnormal {
                    warn!(id, "connection closed abnormally");
                } else {
                    info!(id, "connection closed");
                }
                self.remove(id);
            }
            BrokerEvent::Connection(ConnectionEvent::Faulted { id, error }) => {
                let peer = self.connections.get(&id).and_then(|c| c.peer_addr());
                warn!(id, ?peer, %error, "connection faulted");
                self.remove(id);
            }
        }
    }

    /// Makes a connection routable.
    pub fn register(&mut self, conn: Arc<Connection>) {
        debug!(connection = %conn, "registered");
        self.connections.insert(conn.id(), conn);
    }

    fn dispatch(&mut self, id: ConnectionId, message: Message) {
        let Some(conn) = self.connections.get(&id) else {
            debug!(id, %message, "message from unknown connection dropped");
            return;
        };
        debug!(id, %message, "dispatching");
        let source = conn.downgrade();

        match message {
            Message::SubscriptionRequest(request) => {
                self.bus.to_subscriptions(SubscriptionEvent::Request {
                    subscriber: source,
                    topic: request.topic.clone(),
                    is_add: request.is_add,
                });
                self.bus
                    .to_notifications(NotificationEvent::Forwarded(ForwardedSubscriptionRequest {
                        client_id: id,
                        topic: request.topic,
                        is_add: request.is_add,
                    }));
            }
            Message::NotificationRequest(request) => {
                self.bus.to_notifications(NotificationEvent::Request {
                    notifier: source,
                    pattern: request.pattern,
                    is_add: request.is_add,
                });
            }
            Message::MulticastData(message) => {
                self.bus.to_subscriptions(SubscriptionEvent::Publish {
                    publisher: source,
                    message,
                });
            }
            Message::UnicastData(message) => {
                self.bus.to_subscriptions(SubscriptionEvent::Unicast {
                    publisher: source,
                    message,
                });
            }
            Message::ForwardedSubscriptionRequest(_) => {
                warn!(id, "client sent a broker-only message, closing");
                self.remove(id);
            }
        }
    }

    /// Drops the connection and tells every manager. The publisher manager
    /// hears of it from the subscription manager, behind any data this
    /// connection published earlier. A second call for the same id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        conn.close();
        debug!(connection = %conn, "removed");

        self.bus
            .to_subscriptions(SubscriptionEvent::ConnectionRemoved(id));
        self.bus
            .to_notifications(NotificationEvent::ConnectionRemoved(id));
    }

    fn close_all(&mut self) {
        info!(connections = self.connections.len(), "closing all connections");
        for (_, conn) in self.connections.drain() {
            conn.close();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }
}
