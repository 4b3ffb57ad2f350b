//! Single relay connection management
//!
//! A [`RelayConnection`] owns one websocket. Connecting retries with bounded
//! exponential backoff; once open, a reader task parses relay frames,
//! resolves publish confirmations and fans frames out on a broadcast channel,
//! while a writer task drains outgoing frames.

use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, Filter, RelayMessage};
use crate::recovery::ExponentialBackoff;
use futures::{SinkExt, StreamExt};
use nostr::Event;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Relay answer to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfirmation {
    pub event_id: String,
    pub accepted: bool,
    /// Empty when accepted; the relay's reason otherwise
    pub message: String,
}

type ConfirmationSender = oneshot::Sender<PublishConfirmation>;

/// Relay connection configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Timeout for a single connection attempt
    pub connect_timeout: Duration,
    /// Retry policy applied by [`RelayConnection::connect`]
    pub retry: ExponentialBackoff,
    /// Capacity of the per-connection broadcast of relay frames
    pub message_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            retry: ExponentialBackoff::default(),
            message_buffer: 1024,
        }
    }
}

/// Live halves of an open socket.
struct Live {
    outgoing: mpsc::UnboundedSender<Message>,
    messages: broadcast::Sender<RelayMessage>,
    reader: JoinHandle<()>,
}

/// Relay connection
pub struct RelayConnection {
    /// URL exactly as the caller gave it; used as the relay's identity
    url: String,
    parsed: Url,
    config: RelayConfig,
    state: Arc<RwLock<ConnectionState>>,
    live: Arc<Mutex<Option<Live>>>,
    /// Pending event confirmations (event_id -> oneshot sender)
    pending_confirmations: Arc<Mutex<HashMap<String, ConfirmationSender>>>,
}

impl RelayConnection {
    /// Create a new relay connection (does not connect yet)
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    /// Create a new relay connection with custom config
    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        let parsed = Url::parse(url)?;

        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: url.to_string(),
            parsed,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            live: Arc::new(Mutex::new(None)),
            pending_confirmations: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Connect, retrying with backoff until the attempt budget is spent.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected().await {
            return Ok(());
        }

        let mut backoff = self.config.retry.clone();
        backoff.reset();

        loop {
            let err = match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        "Connection attempt {} to {} failed: {}; retrying in {:?}",
                        backoff.attempt(),
                        self.url,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(
                        "Giving up on {} after {} attempts: {}",
                        self.url,
                        backoff.attempt(),
                        err
                    );
                    return Err(ClientError::Connection(format!(
                        "{} unreachable after {} attempts: {}",
                        self.url,
                        backoff.attempt(),
                        err
                    )));
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<()> {
        *self.state.write().await = ConnectionState::Connecting;
        info!("Connecting to relay: {}", self.url);

        let connect_start = Instant::now();
        let ws_stream = match timeout(
            self.config.connect_timeout,
            connect_async(self.parsed.as_str()),
        )
        .await
        {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::WebSocket(e.to_string()));
            }
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::Timeout(format!(
                    "Connection timeout after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (msg_tx, _) = broadcast::channel(self.config.message_buffer);

        // Held until the handles are stored so a reader that ends at once
        // cannot clear the slot before it is filled.
        let mut live_slot = self.live.lock().await;
        *self.state.write().await = ConnectionState::Connected;

        // Ends once every outgoing sender is gone, after flushing what is queued
        let writer_url = self.url.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!("Failed to write to {}: {}", writer_url, e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = {
            let url = self.url.clone();
            let state = Arc::clone(&self.state);
            let live = Arc::clone(&self.live);
            let pending_confirmations = Arc::clone(&self.pending_confirmations);
            let pong_tx = out_tx.clone();
            let msg_tx = msg_tx.clone();

            tokio::spawn(async move {
                while let Some(frame) = stream.next().await {
                    let text = match frame {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Ping(data)) => {
                            let _ = pong_tx.send(Message::Pong(data));
                            continue;
                        }
                        Ok(Message::Close(_)) => {
                            info!("Relay {} closed connection", url);
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("WebSocket error from {}: {}", url, e);
                            break;
                        }
                    };

                    let relay_msg = match RelayMessage::from_json(text.as_str()) {
                        Ok(msg) => msg,
                        Err(e) => {
                            debug!("Dropping unparseable frame from {}: {}", url, e);
                            continue;
                        }
                    };

                    if let RelayMessage::Ok {
                        event_id,
                        accepted,
                        message,
                    } = &relay_msg
                        && let Some(tx) = pending_confirmations.lock().await.remove(event_id)
                    {
                        let _ = tx.send(PublishConfirmation {
                            event_id: event_id.clone(),
                            accepted: *accepted,
                            message: message.clone(),
                        });
                    }

                    // No receivers is fine: nobody is listening yet
                    let _ = msg_tx.send(relay_msg);
                }

                *state.write().await = ConnectionState::Disconnected;
                pending_confirmations.lock().await.clear();
                // Dropping the stored sender closes every receiver
                live.lock().await.take();
            })
        };

        *live_slot = Some(Live {
            outgoing: out_tx,
            messages: msg_tx,
            reader,
        });
        drop(live_slot);

        info!(
            "Connected to relay: {} (took {:?})",
            self.url,
            connect_start.elapsed()
        );
        Ok(())
    }

    /// Disconnect from the relay
    pub async fn disconnect(&self) {
        let Some(live) = self.live.lock().await.take() else {
            return;
        };

        info!("Disconnecting from relay: {}", self.url);
        let _ = live.outgoing.send(Message::Close(None));
        live.reader.abort();
        self.pending_confirmations.lock().await.clear();
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// Receive every frame this relay sends from now on.
    ///
    /// The receiver closes when the connection drops.
    pub async fn messages(&self) -> Result<broadcast::Receiver<RelayMessage>> {
        self.live
            .lock()
            .await
            .as_ref()
            .map(|live| live.messages.subscribe())
            .ok_or(ClientError::NotConnected)
    }

    /// Publish an event and wait for the relay's `OK`.
    pub async fn publish_event(
        &self,
        event: &Event,
        confirmation_timeout: Duration,
    ) -> Result<PublishConfirmation> {
        let (tx, rx) = oneshot::channel();
        self.pending_confirmations
            .lock()
            .await
            .insert(event.id.clone(), tx);

        if let Err(e) = self.send(&ClientMessage::Event(event.clone())).await {
            self.pending_confirmations.lock().await.remove(&event.id);
            return Err(e);
        }

        match timeout(confirmation_timeout, rx).await {
            Ok(Ok(confirmation)) => Ok(confirmation),
            Ok(Err(_)) => Err(ClientError::PublishFailed(format!(
                "{} dropped before confirming {}",
                self.url, event.id
            ))),
            Err(_) => {
                self.pending_confirmations.lock().await.remove(&event.id);
                Err(ClientError::Timeout(format!(
                    "Event confirmation timeout after {:?}",
                    confirmation_timeout
                )))
            }
        }
    }

    /// Send a `REQ`.
    pub async fn subscribe(&self, subscription_id: &str, filters: Vec<Filter>) -> Result<()> {
        self.send(&ClientMessage::Req {
            subscription_id: subscription_id.to_string(),
            filters,
        })
        .await
    }

    /// Send a `CLOSE`.
    pub async fn close_subscription(&self, subscription_id: &str) -> Result<()> {
        self.send(&ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        })
        .await
    }

    /// Queue a client frame on the writer task.
    pub async fn send(&self, msg: &ClientMessage) -> Result<()> {
        let text = msg.to_json()?;
        debug!("Sending to {}: {}", self.url, text);

        let live = self.live.lock().await;
        let live = live.as_ref().ok_or(ClientError::NotConnected)?;
        live.outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Relay URL as given to [`RelayConnection::new`]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.live.try_lock()
            && let Some(live) = guard.take()
        {
            live.reader.abort();
        }
    }
}
