//! Event signers.
//!
//! A [`Signer`] turns event templates into signed events and performs NIP-04
//! encryption for one identity. [`LocalSigner`] holds the secret key in
//! memory. [`DelegatedSigner`] forwards every request to a [`SigningAgent`]
//! (a browser extension or any equivalent key holder) and waits for it to
//! approve; it never sees the secret key.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use nostr::{Event, EventTemplate, Keys, PublicKey, UnsignedEvent, finalize_event, verify_event};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Where signing happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerBackend {
    Local,
    Delegated,
}

#[async_trait]
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;

    async fn sign_event(&self, template: EventTemplate) -> Result<Event>;

    async fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String>;

    async fn nip04_decrypt(&self, peer: &PublicKey, ciphertext: &str) -> Result<String>;

    fn backend(&self) -> SignerBackend;
}

/// Signs with a secret key held in memory.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    keys: Keys,
}

impl LocalSigner {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }

    /// Build from an `nsec` or hex secret key.
    pub fn parse(secret: &str) -> Result<Self> {
        Ok(Self::new(Keys::parse(secret)?))
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    async fn sign_event(&self, template: EventTemplate) -> Result<Event> {
        Ok(finalize_event(&template, self.keys.secret_key())?)
    }

    async fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        Ok(nostr::encrypt(self.keys.secret_key(), peer, plaintext)?)
    }

    async fn nip04_decrypt(&self, peer: &PublicKey, ciphertext: &str) -> Result<String> {
        Ok(nostr::decrypt(self.keys.secret_key(), peer, ciphertext)?)
    }

    fn backend(&self) -> SignerBackend {
        SignerBackend::Local
    }
}

/// An external key holder that approves requests one at a time.
#[async_trait]
pub trait SigningAgent: Send + Sync {
    async fn get_public_key(&self) -> Result<PublicKey>;

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event>;

    async fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String>;

    async fn nip04_decrypt(&self, peer: &PublicKey, ciphertext: &str) -> Result<String>;
}

/// How long a delegated request may wait for the user to approve it.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Defers every operation to an attached [`SigningAgent`].
///
/// With no agent attached all operations fail with
/// [`ClientError::SignerUnavailable`]. Events the agent returns must carry
/// this signer's key, match the request and verify.
pub struct DelegatedSigner {
    public_key: PublicKey,
    agent: RwLock<Option<Arc<dyn SigningAgent>>>,
    approval_timeout: Duration,
}

impl DelegatedSigner {
    /// A signer for `public_key` with no agent attached yet.
    pub fn detached(public_key: PublicKey) -> Self {
        Self {
            public_key,
            agent: RwLock::new(None),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }

    /// Ask `agent` for its key and attach it.
    pub async fn connect(agent: Arc<dyn SigningAgent>) -> Result<Self> {
        let public_key = timeout(DEFAULT_APPROVAL_TIMEOUT, agent.get_public_key())
            .await
            .map_err(|_| ClientError::SignerUnavailable("agent did not share its key".to_string()))??;
        let signer = Self::detached(public_key);
        *signer.agent.write().await = Some(agent);
        Ok(signer)
    }

    pub fn with_approval_timeout(mut self, approval_timeout: Duration) -> Self {
        self.approval_timeout = approval_timeout;
        self
    }

    pub async fn attach(&self, agent: Arc<dyn SigningAgent>) -> Result<()> {
        let agent_key = self.approve(agent.get_public_key()).await?;
        if agent_key != self.public_key {
            return Err(ClientError::SignerUnavailable(format!(
                "agent holds {} instead of {}",
                agent_key, self.public_key
            )));
        }
        *self.agent.write().await = Some(agent);
        Ok(())
    }

    pub async fn detach(&self) {
        self.agent.write().await.take();
    }

    pub async fn is_attached(&self) -> bool {
        self.agent.read().await.is_some()
    }

    async fn agent(&self) -> Result<Arc<dyn SigningAgent>> {
        self.agent
            .read()
            .await
            .clone()
            .ok_or_else(|| ClientError::SignerUnavailable("no signing agent attached".to_string()))
    }

    async fn approve<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.approval_timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Signing agent did not answer within {:?}", self.approval_timeout);
                Err(ClientError::SignerUnavailable(format!(
                    "no approval within {:?}",
                    self.approval_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl Signer for DelegatedSigner {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    async fn sign_event(&self, template: EventTemplate) -> Result<Event> {
        let agent = self.agent().await?;
        let unsigned = template.into_unsigned(&self.public_key);
        let event = self.approve(agent.sign_event(unsigned.clone())).await?;

        if event.pubkey != unsigned.pubkey {
            return Err(ClientError::InvalidEvent(format!(
                "agent signed as {} instead of {}",
                event.pubkey, unsigned.pubkey
            )));
        }
        if event.kind != unsigned.kind
            || event.content != unsigned.content
            || event.tags != unsigned.tags
            || event.created_at != unsigned.created_at
        {
            return Err(ClientError::InvalidEvent(
                "agent altered the event it was asked to sign".to_string(),
            ));
        }
        if !verify_event(&event)? {
            return Err(ClientError::InvalidEvent(
                "agent returned an invalid signature".to_string(),
            ));
        }

        debug!("Delegated signature for event {}", event.id);
        Ok(event)
    }

    async fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        let agent = self.agent().await?;
        self.approve(agent.nip04_encrypt(peer, plaintext)).await
    }

    async fn nip04_decrypt(&self, peer: &PublicKey, ciphertext: &str) -> Result<String> {
        let agent = self.agent().await?;
        self.approve(agent.nip04_decrypt(peer, ciphertext)).await
    }

    fn backend(&self) -> SignerBackend {
        SignerBackend::Delegated
    }
}
