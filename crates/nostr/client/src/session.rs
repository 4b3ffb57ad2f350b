//! Identity sessions.
//!
//! A [`NostrSession`] binds one relay pool to at most one signer. Every
//! identity that acts on the network (a student, a badge issuer, a demo
//! user) gets its own session, so switching identity never mutates a signer
//! another caller is using.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::identity::{IdentityStore, authenticate};
use crate::message::Filter;
use crate::pool::{ConnectReport, PublishOutcome, RelayPool};
use crate::signer::{LocalSigner, Signer};
use crate::subscription::{EventStream, FetchOptions, FetchOutcome};
use nostr::{Event, EventTemplate, Keys, PublicKey};
use std::sync::Arc;
use tracing::{debug, info};

/// One identity's view of the network.
#[derive(Clone)]
pub struct NostrSession {
    pool: RelayPool,
    signer: Option<Arc<dyn Signer>>,
    config: ClientConfig,
}

impl NostrSession {
    pub fn new(config: ClientConfig, signer: Option<Arc<dyn Signer>>) -> Self {
        Self {
            pool: RelayPool::with_config(config.relay_config()),
            signer,
            config,
        }
    }

    /// A session that can read but not publish.
    pub fn read_only(config: ClientConfig) -> Self {
        Self::new(config, None)
    }

    /// Connect to every configured relay.
    pub async fn connect(&self) -> Result<ConnectReport> {
        let report = self.pool.connect(&self.config.relays).await?;
        info!(
            "Session {} connected to {}/{} relays",
            self.describe(),
            report.connected.len(),
            self.config.relays.len()
        );
        Ok(report)
    }

    pub async fn disconnect(&self) {
        self.pool.disconnect_all().await;
    }

    pub fn pool(&self) -> &RelayPool {
        &self.pool
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn signer(&self) -> Result<&Arc<dyn Signer>> {
        self.signer.as_ref().ok_or(ClientError::NoSigner)
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.signer.as_ref().map(|s| s.public_key())
    }

    pub async fn sign(&self, template: EventTemplate) -> Result<Event> {
        self.signer()?.sign_event(template).await
    }

    /// Sign and publish an event built from its parts.
    pub async fn publish(
        &self,
        kind: u16,
        content: impl Into<String>,
        tags: Vec<Vec<String>>,
    ) -> Result<PublishOutcome> {
        self.publish_template(EventTemplate::new(kind, content).with_tags(tags))
            .await
    }

    /// Sign and publish a template.
    ///
    /// Zero acknowledgments are returned as an outcome with an empty ack set,
    /// not as an error.
    pub async fn publish_template(&self, template: EventTemplate) -> Result<PublishOutcome> {
        let event = self.sign(template).await?;
        Ok(self.publish_event(&event).await)
    }

    /// Publish an already signed event.
    pub async fn publish_event(&self, event: &Event) -> PublishOutcome {
        self.pool.publish(event, self.config.ack_timeout).await
    }

    /// Bounded query with the configured timeouts.
    pub async fn fetch(&self, filters: Vec<Filter>) -> Result<FetchOutcome> {
        self.fetch_with(filters, self.config.fetch_options()).await
    }

    pub async fn fetch_with(
        &self,
        filters: Vec<Filter>,
        options: FetchOptions,
    ) -> Result<FetchOutcome> {
        self.pool.fetch_events(filters, options).await
    }

    pub async fn stream(&self, filters: Vec<Filter>, options: FetchOptions) -> Result<EventStream> {
        self.pool.stream_events(filters, options).await
    }

    fn describe(&self) -> String {
        match self.public_key() {
            Some(pk) => pk.to_hex()[..8].to_string(),
            None => "read-only".to_string(),
        }
    }
}

/// Builds sessions that share one configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionFactory {
    config: ClientConfig,
}

impl SessionFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session without a signer, for public reads.
    pub fn anonymous(&self) -> NostrSession {
        NostrSession::read_only(self.config.clone())
    }

    /// Session for a throwaway identity that is never persisted.
    pub fn demo(&self) -> NostrSession {
        let keys = Keys::generate();
        debug!("Demo session for {}", keys.public_key());
        self.with_keys(keys)
    }

    pub fn with_keys(&self, keys: Keys) -> NostrSession {
        self.with_signer(Arc::new(LocalSigner::new(keys)))
    }

    pub fn with_signer(&self, signer: Arc<dyn Signer>) -> NostrSession {
        NostrSession::new(self.config.clone(), Some(signer))
    }

    /// Session for the identity held by `store`, importing `secret` when
    /// given.
    pub async fn authenticated(
        &self,
        store: &dyn IdentityStore,
        secret: Option<&str>,
    ) -> Result<NostrSession> {
        let keys = authenticate(store, secret).await?;
        Ok(self.with_keys(keys))
    }
}
