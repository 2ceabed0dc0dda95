use std::future::Future;
use std::net::SocketAddr;

use tokio::sync::mpsc::unbounded_channel;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::broker::engine::Broker;
use crate::broker::event::{BrokerEvent, Bus};
use crate::broker::notification::NotificationManager;
use crate::broker::publisher::PublisherManager;
use crate::broker::subscription::SubscriptionManager;
use crate::config::ServerSettings;
use crate::transport::{Acceptor, MessageCodec};
use crate::utils::error::BrokerError;

/// A running broker: the acceptor, the broker worker and the three manager
/// workers, all stopped together by one cancellation token.
#[derive(Debug)]
pub struct Server {
    name: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    acceptor: JoinHandle<Result<(), BrokerError>>,
    workers: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds the listener and starts every worker.
    pub async fn start(settings: &ServerSettings) -> Result<Server, BrokerError> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let codec = MessageCodec::new(settings.wire_profile, settings.max_frame_size);
        let acceptor = Acceptor::bind(&addr, codec).await?;
        let local_addr = acceptor
            .local_addr()
            .map_err(|e| BrokerError::bind(addr.as_str(), e))?;

        let shutdown = CancellationToken::new();
        let (bus, receivers) = Bus::new();
        let (broker_tx, broker_rx) = unbounded_channel::<BrokerEvent>();

        let workers = vec![
            tokio::spawn(
                SubscriptionManager::new(bus.clone()).run(receivers.subscriptions, shutdown.clone()),
            ),
            tokio::spawn(
                NotificationManager::new(bus.clone()).run(receivers.notifications, shutdown.clone()),
            ),
            tokio::spawn(
                PublisherManager::new(bus.clone()).run(receivers.publishers, shutdown.clone()),
            ),
            tokio::spawn(Broker::new(bus).run(broker_rx, shutdown.clone())),
        ];
        let acceptor = tokio::spawn(acceptor.run(broker_tx, shutdown.clone()));

        info!(
            name = %settings.name,
            %local_addr,
            profile = ?settings.wire_profile,
            "server started"
        );

        Ok(Server {
            name: settings.name.clone(),
            local_addr,
            shutdown,
            acceptor,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serves until `signal` completes or the accept loop fails, then shuts
    /// everything down.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), BrokerError>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            res = &mut self.acceptor => flatten(res),
            _ = signal => {
                info!(name = %self.name, "shutdown requested");
                Ok(())
            }
        };
        if let Err(e) = &result {
            error!(name = %self.name, error = %e, "server stopping after failure");
        }
        self.stop().await?;
        result
    }

    /// Stops accepting, closes every connection and waits for the workers.
    pub async fn shutdown(mut self) -> Result<(), BrokerError> {
        self.stop().await?;
        flatten((&mut self.acceptor).await)
    }

    async fn stop(&mut self) -> Result<(), BrokerError> {
        self.shutdown.cancel();
        for worker in self.workers.drain(..) {
            worker.await?;
        }
        info!(name = %self.name, "server stopped");
        Ok(())
    }
}

fn flatten(res: Result<Result<(), BrokerError>, tokio::task::JoinError>) -> Result<(), BrokerError> {
    res?
}
