//! A publisher that keeps the last known image of every topic it publishes.
//!
//! When the broker reports a new subscriber the cached image is unicast to
//! it once, so late joiners start from a full snapshot and then follow the
//! deltas like everyone else.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use crate::client::pubsub_client::{Client, ClientEvent, ClientEvents};
use crate::codec::Value;
use crate::config::ClientSettings;
use crate::transport::ClientId;
use crate::utils::error::TransportError;

#[derive(Debug, Default)]
struct CacheItem {
    /// Whether each known subscriber has been sent the image yet.
    client_states: BTreeMap<ClientId, bool>,
    data: HashMap<String, Value>,
}

type Cache = Arc<Mutex<HashMap<String, CacheItem>>>;

#[derive(Debug, Clone)]
pub struct CachingPublisher {
    client: Client,
    cache: Cache,
}

/// Data and closure events of a [`CachingPublisher`]. Subscription notices
/// are consumed by the publisher itself.
#[derive(Debug)]
pub struct CachingEvents {
    rx: UnboundedReceiver<ClientEvent>,
}

impl CachingEvents {
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }
}

impl CachingPublisher {
    pub async fn connect(settings: &ClientSettings) -> Result<(CachingPublisher, CachingEvents), TransportError> {
        let (client, events) = Client::connect(settings).await?;
        Ok(CachingPublisher::new(client, events))
    }

    /// Takes over `events`; forwarded subscriptions are answered from the
    /// cache and everything else is passed on.
    pub fn new(client: Client, events: ClientEvents) -> (CachingPublisher, CachingEvents) {
        let publisher = CachingPublisher {
            client,
            cache: Cache::default(),
        };
        let (tx, rx) = unbounded_channel();
        publisher.spawn_pump(events, tx);
        (publisher, CachingEvents { rx })
    }

    fn spawn_pump(&self, mut events: ClientEvents, out: UnboundedSender<ClientEvent>) {
        let publisher = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ClientEvent::ForwardedSubscription {
                        client_id,
                        topic,
                        is_add,
                    } => publisher.on_forwarded_subscription(client_id, &topic, is_add),
                    other => {
                        // the caller may have stopped listening; keep serving images
                        let _ = out.send(other);
                    }
                }
            }
            debug!("caching publisher event pump stopped");
        });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheItem>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn on_forwarded_subscription(&self, client_id: ClientId, topic: &str, is_add: bool) {
        let mut cache = self.lock();
        if is_add {
            let item = cache.entry(topic.to_string()).or_default();
            let sent = item.client_states.entry(client_id).or_insert(false);
            if !*sent {
                let image = Value::Map(item.data.clone());
                match self.client.send(client_id, topic, true, &image) {
                    Ok(()) => *sent = true,
                    // left unmarked so the next publish retries the image
                    Err(e) => warn!(client_id, topic, error = %e, "could not send image"),
                }
            }
        } else if let Some(item) = cache.get_mut(topic) {
            if item.client_states.remove(&client_id).is_some()
                && item.client_states.is_empty()
                && item.data.is_empty()
            {
                cache.remove(topic);
            }
        }
    }

    /// Merges `data` into the cached image of `topic` and publishes it as a
    /// delta. Subscribers that have not had the image yet get the full image
    /// instead, in which case every subscriber is addressed individually.
    pub fn publish(&self, topic: &str, data: HashMap<String, Value>) -> Result<(), TransportError> {
        let mut cache = self.lock();
        let item = cache.entry(topic.to_string()).or_default();
        item.data
            .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));

        let delta = Value::Map(data);
        if item.client_states.values().all(|sent| *sent) {
            return self.client.publish(topic, false, &delta);
        }

        for (client_id, sent) in item.client_states.iter_mut() {
            if *sent {
                self.client.send(*client_id, topic, false, &delta)?;
            } else {
                self.client
                    .send(*client_id, topic, true, &Value::Map(item.data.clone()))?;
                *sent = true;
            }
        }
        Ok(())
    }

    pub fn add_subscription(&self, topic: &str) -> Result<(), TransportError> {
        self.client.add_subscription(topic)
    }

    pub fn remove_subscription(&self, topic: &str) -> Result<(), TransportError> {
        self.client.remove_subscription(topic)
    }

    pub fn add_notification(&self, pattern: &str) -> Result<(), TransportError> {
        self.client.add_notification(pattern)
    }

    pub fn remove_notification(&self, pattern: &str) -> Result<(), TransportError> {
        self.client.remove_notification(pattern)
    }

    pub fn close(&self) {
        self.client.close();
    }

    /// The cached image of `topic`, if any.
    pub fn image(&self, topic: &str) -> Option<HashMap<String, Value>> {
        self.lock().get(topic).map(|item| item.data.clone())
    }

    pub(crate) fn known_clients(&self, topic: &str) -> Vec<ClientId> {
        self.lock()
            .get(topic)
            .map(|item| item.client_states.keys().copied().collect())
            .unwrap_or_default()
    }
}
