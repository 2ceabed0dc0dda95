use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::transport::connection::{Connection, ConnectionEvent, ConnectionId};
use crate::transport::message::MessageCodec;
use crate::utils::error::BrokerError;

/// Listens for clients and hands each accepted socket to the broker as a
/// [`Connection`] with the next id.
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
    codec: MessageCodec,
    /// `None` once every id has been handed out.
    next_id: Option<ConnectionId>,
}

impl Acceptor {
    pub async fn bind(addr: &str, codec: MessageCodec) -> Result<Self, BrokerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BrokerError::bind(addr, e))?;
        Ok(Acceptor {
            listener,
            codec,
            next_id: Some(1),
        })
    }

    #[cfg(test)]
    pub(crate) fn starting_at(mut self, id: ConnectionId) -> Self {
        self.next_id = Some(id);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` fires, which is a normal completion. Any other
    /// end is an unrecoverable listener error.
    ///
    /// Each connection is announced on `events` before its read loop starts,
    /// so the receiver always learns of a connection ahead of its messages.
    pub async fn run<E>(mut self, events: UnboundedSender<E>, shutdown: CancellationToken) -> Result<(), BrokerError>
    where
        E: From<Arc<Connection>> + From<ConnectionEvent> + Send + 'static,
    {
        if let Ok(addr) = self.local_addr() {
            info!("accepting connections on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("acceptor stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "accept failed, continuing");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "accept loop failed");
                    return Err(BrokerError::Accept(e));
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "could not disable nagle");
            }

            // ids are never reused, so running out ends the acceptor
            let Some(id) = self.next_id else {
                error!(%peer, "connection ids exhausted");
                return Err(BrokerError::IdsExhausted);
            };
            self.next_id = id.checked_add(1);

            let (conn, reader) = Connection::open(id, stream, self.codec.clone());
            info!("accepted connection {}", conn);

            if events.send(conn.into()).is_err() {
                debug!("broker gone, acceptor stopping");
                return Ok(());
            }
            reader.spawn(events.clone());
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
