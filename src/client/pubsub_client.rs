use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, info, warn};

use crate::codec::{PayloadEncoding, Value, WireProfile};
use crate::config::{ClientSettings, DEFAULT_MAX_FRAME_SIZE};
use crate::transport::{
    ClientId, Connection, ConnectionEvent, Message, MessageCodec, MulticastData,
    NotificationRequest, SubscriptionRequest, UnicastData,
};
use crate::utils::error::TransportError;

/// What a client observes from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Data {
        topic: String,
        data: Value,
        is_image: bool,
    },
    ForwardedSubscription {
        client_id: ClientId,
        topic: String,
        is_add: bool,
    },
    /// Always the last event. `abnormal` means the link was lost rather than
    /// closed on purpose, so the caller should reconnect and resubscribe.
    Closed { abnormal: bool },
}

/// A connection to the broker.
///
/// Cloning is cheap and every clone drives the same socket.
#[derive(Debug, Clone)]
pub struct Client {
    conn: Arc<Connection>,
    encoding: PayloadEncoding,
}

impl Client {
    /// Connect using the `client` section of the configuration.
    pub async fn connect(settings: &ClientSettings) -> Result<(Client, ClientEvents), TransportError> {
        Client::connect_to(
            &settings.host,
            settings.port,
            settings.wire_profile,
            settings.payload_encoding,
        )
        .await
    }

    pub async fn connect_to(
        host: &str,
        port: u16,
        profile: WireProfile,
        encoding: PayloadEncoding,
    ) -> Result<(Client, ClientEvents), TransportError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::connect(format!("{host}:{port}"), e))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable nagle");
        }

        // the broker assigns ids; ours is only used in local logs
        let codec = MessageCodec::new(profile, DEFAULT_MAX_FRAME_SIZE);
        let (conn, reader) = Connection::open(0, stream, codec);
        info!(local = ?conn.local_addr(), remote = ?conn.peer_addr(), "connected");

        let (tx, rx) = unbounded_channel();
        reader.spawn(tx);

        Ok((Client::from_connection(conn, encoding), ClientEvents::new(rx, encoding)))
    }

    pub(crate) fn from_connection(conn: Arc<Connection>, encoding: PayloadEncoding) -> Self {
        Client { conn, encoding }
    }

    pub fn add_subscription(&self, topic: &str) -> Result<(), TransportError> {
        self.conn.send(SubscriptionRequest {
            topic: topic.to_string(),
            is_add: true,
        })
    }

    pub fn remove_subscription(&self, topic: &str) -> Result<(), TransportError> {
        self.conn.send(SubscriptionRequest {
            topic: topic.to_string(),
            is_add: false,
        })
    }

    /// Multicast `data` to every subscriber of `topic`.
    pub fn publish(&self, topic: &str, is_image: bool, data: &Value) -> Result<(), TransportError> {
        self.conn.send(MulticastData {
            topic: topic.to_string(),
            is_image,
            data: self.encoding.encode(data)?,
        })
    }

    /// Send `data` to one subscriber of `topic`.
    pub fn send(&self, client_id: ClientId, topic: &str, is_image: bool, data: &Value) -> Result<(), TransportError> {
        self.conn.send(UnicastData {
            client_id,
            topic: topic.to_string(),
            is_image,
            data: self.encoding.encode(data)?,
        })
    }

    /// Ask to be told about subscriptions to topics matching `pattern`.
    pub fn add_notification(&self, pattern: &str) -> Result<(), TransportError> {
        self.conn.send(NotificationRequest {
            pattern: pattern.to_string(),
            is_add: true,
        })
    }

    pub fn remove_notification(&self, pattern: &str) -> Result<(), TransportError> {
        self.conn.send(NotificationRequest {
            pattern: pattern.to_string(),
            is_add: false,
        })
    }

    /// Flushes queued messages and closes the socket. The event stream then
    /// ends with `Closed { abnormal: false }`.
    pub fn close(&self) {
        self.conn.close();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.conn.local_addr()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.conn.peer_addr()
    }
}

/// The receiving side of a [`Client`].
#[derive(Debug)]
pub struct ClientEvents {
    rx: UnboundedReceiver<ConnectionEvent>,
    encoding: PayloadEncoding,
    closed: bool,
}

impl ClientEvents {
    pub(crate) fn new(rx: UnboundedReceiver<ConnectionEvent>, encoding: PayloadEncoding) -> Self {
        ClientEvents {
            rx,
            encoding,
            closed: false,
        }
    }

    /// Waits for the next event. Returns `None` once `Closed` has been
    /// yielded.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        while !self.closed {
            let Some(event) = self.rx.recv().await else {
                // reader task gone without a closing event
                self.closed = true;
                return Some(ClientEvent::Closed { abnormal: true });
            };
            if let Some(event) = self.translate(event) {
                return Some(event);
            }
        }
        None
    }

    fn translate(&mut self, event: ConnectionEvent) -> Option<ClientEvent> {
        match event {
            ConnectionEvent::Received { message, .. } => self.on_message(message),
            ConnectionEvent::Closed { abnormal, .. } => {
                self.closed = true;
                Some(ClientEvent::Closed { abnormal })
            }
            ConnectionEvent::Faulted { error, .. } => {
                warn!(%error, "connection to broker failed");
                self.closed = true;
                Some(ClientEvent::Closed { abnormal: true })
            }
        }
    }

    fn on_message(&self, message: Message) -> Option<ClientEvent> {
        let (topic, is_image, data) = match message {
            Message::MulticastData(m) => (m.topic, m.is_image, m.data),
            Message::UnicastData(m) => (m.topic, m.is_image, m.data),
            Message::ForwardedSubscriptionRequest(m) => {
                return Some(ClientEvent::ForwardedSubscription {
                    client_id: m.client_id,
                    topic: m.topic,
                    is_add: m.is_add,
                });
            }
            other => {
                warn!(message = %other, "ignoring request sent by the broker");
                return None;
            }
        };

        match self.encoding.decode(data) {
            Ok(data) => Some(ClientEvent::Data {
                topic,
                data,
                is_image,
            }),
            Err(e) => {
                warn!(%topic, error = %e, "dropping undecodable payload");
                None
            }
        }
    }
}
