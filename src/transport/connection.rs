use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::message::{ClientId, Message, MessageCodec};
use crate::utils::error::{DecodeError, EncodeError, TransportError};

pub type ConnectionId = ClientId;

/// What a connection's read loop reports. Exactly one `Closed` or `Faulted`
/// ends every connection, and nothing follows it.
#[derive(Debug)]
pub enum ConnectionEvent {
    Received {
        id: ConnectionId,
        message: Message,
    },
    Closed {
        id: ConnectionId,
        abnormal: bool,
    },
    Faulted {
        id: ConnectionId,
        error: TransportError,
    },
}

impl ConnectionEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            ConnectionEvent::Received { id, .. }
            | ConnectionEvent::Closed { id, .. }
            | ConnectionEvent::Faulted { id, .. } => *id,
        }
    }
}

/// One stream socket. Outbound messages go through a queue drained by a
/// dedicated writer task, so frames from concurrent senders never interleave.
pub struct Connection {
    id: ConnectionId,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    outbound: UnboundedSender<Message>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Split `stream` and start its writer task. The returned reader does
    /// nothing until [`PendingReader::spawn`] is called.
    pub fn open(id: ConnectionId, stream: TcpStream, codec: MessageCodec) -> (Arc<Connection>, PendingReader) {
        let local_addr = stream.local_addr().ok();
        let peer_addr = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = unbounded_channel();
        let shutdown = CancellationToken::new();
        let write_failed = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(
            id,
            FramedWrite::new(write_half, codec.clone()),
            rx,
            shutdown.clone(),
            write_failed.clone(),
        ));

        let conn = Arc::new(Connection {
            id,
            local_addr,
            peer_addr,
            outbound: tx,
            shutdown: shutdown.clone(),
        });

        let reader = PendingReader {
            id,
            frames: FramedRead::new(read_half, codec),
            shutdown,
            write_failed,
        };

        (conn, reader)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Queue `message` for the writer task.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Disconnected);
        }
        self.outbound
            .send(message.into())
            .map_err(|_| TransportError::Disconnected)
    }

    /// Shut the connection down. Messages already queued are flushed first.
    /// Calling this more than once has no further effect.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.outbound.is_closed()
    }

    pub fn downgrade(self: &Arc<Self>) -> WeakConnection {
        WeakConnection {
            id: self.id,
            inner: Arc::downgrade(self),
        }
    }

    /// A connection with no socket behind it; sent messages land on the
    /// returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(id: ConnectionId) -> (Arc<Connection>, UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        let conn = Arc::new(Connection {
            id,
            local_addr: None,
            peer_addr: None,
            outbound: tx,
            shutdown: CancellationToken::new(),
        });
        (conn, rx)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer_addr {
            Some(addr) => write!(f, "#{} ({})", self.id, addr),
            None => write!(f, "#{}", self.id),
        }
    }
}

/// A lookup-only handle. Holding one never keeps a connection alive.
#[derive(Debug, Clone)]
pub struct WeakConnection {
    id: ConnectionId,
    inner: Weak<Connection>,
}

impl WeakConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Arc<Connection>> {
        self.inner.upgrade()
    }

    pub fn send(&self, message: impl Into<Message>) -> Result<(), TransportError> {
        match self.upgrade() {
            Some(conn) => conn.send(message),
            None => Err(TransportError::Disconnected),
        }
    }
}

/// The read side of a connection, held back until its owner is ready to
/// receive events for it.
pub struct PendingReader {
    id: ConnectionId,
    frames: FramedRead<OwnedReadHalf, MessageCodec>,
    shutdown: CancellationToken,
    write_failed: Arc<AtomicBool>,
}

impl PendingReader {
    pub fn spawn<E>(self, events: UnboundedSender<E>) -> JoinHandle<()>
    where
        E: From<ConnectionEvent> + Send + 'static,
    {
        tokio::spawn(self.run(events))
    }

    async fn run<E>(mut self, events: UnboundedSender<E>)
    where
        E: From<ConnectionEvent> + Send + 'static,
    {
        let id = self.id;
        let end = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    let abnormal = self.write_failed.load(Ordering::Acquire);
                    break ConnectionEvent::Closed { id, abnormal };
                }
                next = self.frames.next() => match next {
                    Some(Ok(message)) => {
                        if events.send(ConnectionEvent::Received { id, message }.into()).is_err() {
                            debug!(id, "event receiver gone, stopping reader");
                            break ConnectionEvent::Closed { id, abnormal: false };
                        }
                    }
                    None | Some(Err(DecodeError::EndOfStream)) => {
                        break ConnectionEvent::Closed { id, abnormal: false };
                    }
                    Some(Err(err)) => {
                        break ConnectionEvent::Faulted { id, error: err.into() };
                    }
                },
            }
        };

        // stop the writer as well
        self.shutdown.cancel();
        debug!(id, ?end, "read loop finished");
        let _ = events.send(end.into());
    }
}

async fn write_loop(
    id: ConnectionId,
    mut sink: FramedWrite<OwnedWriteHalf, MessageCodec>,
    mut outbound: UnboundedReceiver<Message>,
    shutdown: CancellationToken,
    write_failed: Arc<AtomicBool>,
) {
    loop {
        let message = tokio::select! {
            biased;
            message = outbound.recv() => message,
            _ = shutdown.cancelled() => None,
        };
        let Some(message) = message else {
            break;
        };

        match sink.send(message).await {
            Ok(()) => {}
            Err(EncodeError::Io(err)) => {
                warn!(id, error = %err, "write failed, closing connection");
                write_failed.store(true, Ordering::Release);
                shutdown.cancel();
                return;
            }
            Err(err) => {
                warn!(id, error = %err, "dropping message that cannot be encoded");
            }
        }
    }

    // flush what was queued before the close
    while let Ok(message) = outbound.try_recv() {
        if let Err(err) = sink.feed(message).await {
            debug!(id, error = %err, "discarding queued messages");
            break;
        }
    }
    let _ = sink.flush().await;
    let _ = sink.get_mut().shutdown().await;
    debug!(id, "writer stopped");
}
