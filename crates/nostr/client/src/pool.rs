//! Relay pool for managing connections to multiple Nostr relays.
//!
//! A pool connects to a set of relays concurrently, publishes to every
//! connected relay and collects acknowledgments, and routes relay frames to
//! the subscriptions that asked for them. Pools are plain values: each
//! session owns its own.

use crate::error::{ClientError, Result};
use crate::message::{Filter, RelayMessage};
use crate::relay::{RelayConfig, RelayConnection};
use crate::subscription::{
    EventStream, FetchOptions, FetchOutcome, SubscriptionTracker, SubscriptionUpdate,
    generate_subscription_id,
};
use futures::future::join_all;
use nostr::Event;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info, warn};

/// Events emitted by the relay pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Connected { relay_url: String },
    Disconnected { relay_url: String },
    Notice { relay_url: String, message: String },
}

/// Result of [`RelayPool::connect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectReport {
    pub connected: Vec<String>,
    /// Relay URL and the reason it could not be reached
    pub failed: Vec<(String, String)>,
}

/// URL of a relay that accepted an event, exactly as it was configured.
pub type RelayAck = String;

/// Result of publishing one event.
///
/// An empty `acks` set is not an error: the event was signed and sent, but no
/// relay confirmed storing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub event: Event,
    /// Relays that answered `OK true`
    pub acks: BTreeSet<RelayAck>,
    /// Relays that refused or never answered, with the reason
    pub rejected: BTreeMap<String, String>,
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        !self.acks.is_empty()
    }
}

type SubscriptionSender = mpsc::UnboundedSender<SubscriptionUpdate>;

/// A pool of Nostr relay connections.
#[derive(Clone)]
pub struct RelayPool {
    config: RelayConfig,
    /// Connections indexed by URL
    connections: Arc<RwLock<HashMap<String, Arc<RelayConnection>>>>,
    /// Open subscriptions indexed by subscription ID
    subscriptions: Arc<RwLock<HashMap<String, SubscriptionSender>>>,
    /// Broadcast channel for pool events
    events_tx: broadcast::Sender<PoolEvent>,
}

impl RelayPool {
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Pool whose relays all use `config`.
    pub fn with_config(config: RelayConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            config,
            connections: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
        }
    }

    /// Subscribe to pool events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events_tx.subscribe()
    }

    /// All relay URLs in the pool, connected or not.
    pub async fn relay_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.connections.read().await.keys().cloned().collect();
        urls.sort();
        urls
    }

    pub async fn connected_relays(&self) -> Vec<String> {
        let mut urls = Vec::new();
        for conn in self.connected().await {
            urls.push(conn.url().to_string());
        }
        urls.sort();
        urls
    }

    pub async fn connected_count(&self) -> usize {
        self.connected().await.len()
    }

    pub async fn is_connected(&self, url: &str) -> bool {
        let conn = self.connections.read().await.get(url).cloned();
        match conn {
            Some(conn) => conn.is_connected().await,
            None => false,
        }
    }

    async fn connected(&self) -> Vec<Arc<RelayConnection>> {
        let conns: Vec<Arc<RelayConnection>> =
            self.connections.read().await.values().cloned().collect();
        let mut connected = Vec::with_capacity(conns.len());
        for conn in conns {
            if conn.is_connected().await {
                connected.push(conn);
            }
        }
        connected
    }

    /// Add a relay to the pool without connecting.
    pub async fn add_relay(&self, url: &str) -> Result<()> {
        let mut conns = self.connections.write().await;
        if conns.contains_key(url) {
            return Ok(());
        }
        info!("Adding relay to pool: {}", url);
        let conn = RelayConnection::with_config(url, self.config.clone())?;
        conns.insert(url.to_string(), Arc::new(conn));
        Ok(())
    }

    /// Remove a relay from the pool, disconnecting it.
    pub async fn remove_relay(&self, url: &str) {
        info!("Removing relay from pool: {}", url);
        let conn = self.connections.write().await.remove(url);
        if let Some(conn) = conn {
            conn.disconnect().await;
        }
    }

    /// Connect to every relay in `relay_urls` concurrently.
    ///
    /// Resolves once each relay has either opened or exhausted its retries.
    /// Some relays failing is tolerated and logged; none connecting is an error.
    pub async fn connect(&self, relay_urls: &[String]) -> Result<ConnectReport> {
        let mut report = ConnectReport::default();

        let mut candidates = Vec::new();
        for url in relay_urls {
            match self.add_relay(url).await {
                Ok(()) => candidates.push(url.clone()),
                Err(e) => report.failed.push((url.clone(), e.to_string())),
            }
        }

        let results = join_all(candidates.iter().map(|url| async move {
            (url.clone(), self.connect_relay(url).await)
        }))
        .await;

        for (url, result) in results {
            match result {
                Ok(()) => report.connected.push(url),
                Err(e) => report.failed.push((url, e.to_string())),
            }
        }

        if report.connected.is_empty() {
            return Err(ClientError::Connection(format!(
                "no relay reachable out of {}",
                relay_urls.len()
            )));
        }

        if !report.failed.is_empty() {
            warn!(
                "Connected to {} of {} relays; unreachable: {:?}",
                report.connected.len(),
                relay_urls.len(),
                report.failed
            );
        }

        Ok(report)
    }

    /// Connect one relay already in the pool (or add it first).
    pub async fn connect_relay(&self, url: &str) -> Result<()> {
        self.add_relay(url).await?;
        let conn = self
            .connections
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or(ClientError::NotConnected)?;

        if conn.is_connected().await {
            return Ok(());
        }

        conn.connect().await?;
        let messages = conn.messages().await?;
        self.spawn_message_forwarder(url.to_string(), messages);

        let _ = self.events_tx.send(PoolEvent::Connected {
            relay_url: url.to_string(),
        });
        Ok(())
    }

    /// Route one relay's frames to the subscriptions that own them.
    fn spawn_message_forwarder(
        &self,
        relay_url: String,
        mut rx: broadcast::Receiver<RelayMessage>,
    ) {
        let events_tx = self.events_tx.clone();
        let subscriptions = Arc::clone(&self.subscriptions);

        tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Forwarder for {} skipped {} frames", relay_url, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let (subscription_id, update) = match msg {
                    RelayMessage::Event {
                        subscription_id,
                        event,
                    } => (
                        subscription_id,
                        SubscriptionUpdate::Event {
                            relay_url: relay_url.clone(),
                            event,
                        },
                    ),
                    RelayMessage::Eose { subscription_id } => (
                        subscription_id,
                        SubscriptionUpdate::Eose {
                            relay_url: relay_url.clone(),
                        },
                    ),
                    RelayMessage::Closed {
                        subscription_id,
                        message,
                    } => {
                        warn!(
                            "Subscription {} closed by {}: {}",
                            subscription_id, relay_url, message
                        );
                        (
                            subscription_id,
                            SubscriptionUpdate::Closed {
                                relay_url: relay_url.clone(),
                                message,
                            },
                        )
                    }
                    RelayMessage::Notice { message } => {
                        debug!("Notice from {}: {}", relay_url, message);
                        let _ = events_tx.send(PoolEvent::Notice {
                            relay_url: relay_url.clone(),
                            message,
                        });
                        continue;
                    }
                    // OK frames are resolved by the connection itself
                    RelayMessage::Ok { .. } | RelayMessage::Auth { .. } => continue,
                };

                if let Some(tx) = subscriptions.read().await.get(&subscription_id) {
                    let _ = tx.send(update);
                }
            }

            debug!("Forwarder for {} stopped", relay_url);
            for tx in subscriptions.read().await.values() {
                let _ = tx.send(SubscriptionUpdate::Disconnected {
                    relay_url: relay_url.clone(),
                });
            }
            let _ = events_tx.send(PoolEvent::Disconnected { relay_url });
        });
    }

    /// Disconnect from all relays.
    pub async fn disconnect_all(&self) {
        let conns: Vec<Arc<RelayConnection>> =
            self.connections.read().await.values().cloned().collect();
        for conn in conns {
            conn.disconnect().await;
        }
    }

    /// Publish to every connected relay and wait for their `OK`s.
    pub async fn publish(&self, event: &Event, ack_timeout: Duration) -> PublishOutcome {
        let conns = self.connected().await;
        let results = join_all(conns.iter().map(|conn| async move {
            (
                conn.url().to_string(),
                conn.publish_event(event, ack_timeout).await,
            )
        }))
        .await;

        let mut acks = BTreeSet::new();
        let mut rejected = BTreeMap::new();
        for (url, result) in results {
            match result {
                Ok(confirmation) if confirmation.accepted => {
                    acks.insert(url);
                }
                Ok(confirmation) => {
                    rejected.insert(url, confirmation.message);
                }
                Err(e) => {
                    rejected.insert(url, e.to_string());
                }
            }
        }

        if acks.is_empty() {
            warn!(
                "Event {} (kind {}) was not acknowledged by any of {} relays",
                event.id,
                event.kind,
                conns.len()
            );
        } else {
            debug!("Event {} acknowledged by {:?}", event.id, acks);
        }

        PublishOutcome {
            event: event.clone(),
            acks,
            rejected,
        }
    }

    /// Open a fresh subscription on every connected relay.
    ///
    /// Each call sends a new `REQ`, so a finished query can simply be run
    /// again.
    pub async fn stream_events(
        &self,
        filters: Vec<Filter>,
        options: FetchOptions,
    ) -> Result<EventStream> {
        let conns = self.connected().await;
        if conns.is_empty() {
            return Err(ClientError::NotConnected);
        }

        let subscription_id = generate_subscription_id();
        let mut tracker = SubscriptionTracker::new(&subscription_id, filters.clone());

        // Registered before any REQ goes out so no early frame is lost.
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .write()
            .await
            .insert(subscription_id.clone(), tx);

        for conn in conns {
            match conn.subscribe(&subscription_id, filters.clone()).await {
                Ok(()) => tracker.add_relay(conn.url()),
                Err(e) => warn!("Failed to subscribe on {}: {}", conn.url(), e),
            }
        }

        debug!(
            "Subscription {} open on {} relays",
            subscription_id,
            tracker.relay_count()
        );
        Ok(EventStream::new(tracker, rx, options, Some(self.clone())))
    }

    /// Run a bounded query to completion.
    pub async fn fetch_events(
        &self,
        filters: Vec<Filter>,
        options: FetchOptions,
    ) -> Result<FetchOutcome> {
        Ok(self.stream_events(filters, options).await?.collect().await)
    }

    /// Forget a subscription and send `CLOSE` to every connected relay.
    pub async fn unsubscribe(&self, subscription_id: &str) {
        self.subscriptions.write().await.remove(subscription_id);
        for conn in self.connected().await {
            if let Err(e) = conn.close_subscription(subscription_id).await {
                debug!(
                    "Failed to close {} on {}: {}",
                    subscription_id,
                    conn.url(),
                    e
                );
            }
        }
    }

    pub(crate) async fn close_on_relay(&self, relay_url: &str, subscription_id: &str) {
        let conn = self.connections.read().await.get(relay_url).cloned();
        if let Some(conn) = conn
            && let Err(e) = conn.close_subscription(subscription_id).await
        {
            debug!("Failed to close {} on {}: {}", subscription_id, relay_url, e);
        }
    }

    pub async fn subscription_ids(&self) -> Vec<String> {
        self.subscriptions.read().await.keys().cloned().collect()
    }
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::ExponentialBackoff;
    use nostr::{EventTemplate, Keys, finalize_event};

    #[tokio::test]
    async fn test_pool_add_and_remove_relay() {
        let pool = RelayPool::new();
        pool.add_relay("wss://relay1.com").await.unwrap();
        pool.add_relay("wss://relay2.com").await.unwrap();
        pool.add_relay("wss://relay2.com").await.unwrap();

        assert_eq!(pool.relay_urls().await.len(), 2);

        pool.remove_relay("wss://relay1.com").await;
        assert_eq!(pool.relay_urls().await, vec!["wss://relay2.com".to_string()]);
        assert_eq!(pool.connected_count().await, 0);
    }

    #[tokio::test]
    async fn test_pool_rejects_bad_urls() {
        let pool = RelayPool::new();
        assert!(pool.add_relay("https://relay.example.com").await.is_err());
        assert!(pool.relay_urls().await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_with_no_relays_fails() {
        let pool = RelayPool::new();
        assert!(matches!(
            pool.connect(&[]).await,
            Err(ClientError::Connection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_fails_when_every_relay_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let pool = RelayPool::with_config(RelayConfig {
            connect_timeout: Duration::from_secs(1),
            retry: ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(10), 2),
            ..Default::default()
        });
        let result = pool
            .connect(&[format!("ws://{}", addr), "ftp://nope".to_string()])
            .await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn test_publish_without_relays_is_soft_failure() {
        let keys = Keys::generate();
        let event = finalize_event(&EventTemplate::new(1, "hi"), keys.secret_key()).unwrap();

        let outcome = RelayPool::new()
            .publish(&event, Duration::from_millis(100))
            .await;
        assert!(!outcome.is_delivered());
        assert!(outcome.acks.is_empty());
        assert_eq!(outcome.event, event);
    }

    #[tokio::test]
    async fn test_stream_requires_a_connected_relay() {
        let pool = RelayPool::new();
        pool.add_relay("wss://relay.example.com").await.unwrap();
        assert!(matches!(
            pool.stream_events(vec![Filter::new().kind(1)], FetchOptions::default())
                .await,
            Err(ClientError::NotConnected)
        ));
        assert!(pool.subscription_ids().await.is_empty());
    }
}
