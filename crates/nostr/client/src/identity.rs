//! Durable identity storage and authentication.
//!
//! The client never decides where a secret key lives; it asks an
//! [`IdentityStore`]. A JSON file under the user config directory is the
//! default, and an in-memory store backs tests.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use nostr::{Keys, unix_now};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Persisted identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub npub: String,
    pub nsec: String,
    pub created_at: u64,
}

impl StoredIdentity {
    pub fn from_keys(keys: &Keys) -> Result<Self> {
        Ok(Self {
            npub: keys.public_key().to_npub()?,
            nsec: keys.secret_key().to_nsec()?,
            created_at: unix_now(),
        })
    }

    /// Rebuild the keys, refusing a record whose `npub` does not belong to
    /// its `nsec`.
    pub fn keys(&self) -> Result<Keys> {
        let keys = Keys::parse(&self.nsec)?;
        if keys.public_key().to_npub()? != self.npub {
            return Err(ClientError::Storage(
                "stored npub does not match stored nsec".to_string(),
            ));
        }
        Ok(keys)
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredIdentity>>;

    async fn save(&self, identity: &StoredIdentity) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Identity kept as JSON in a single file.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `identity.json` next to the client config.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ClientError::Storage("could not determine config directory".into()))?;
        Ok(config_dir.join(crate::config::APP_DIR).join("identity.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Option<StoredIdentity>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, identity: &StoredIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(identity)?).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        debug!("Identity saved to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if fs::try_exists(&self.path).await? {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identity: Mutex<Option<StoredIdentity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load(&self) -> Result<Option<StoredIdentity>> {
        Ok(self.identity.lock().await.clone())
    }

    async fn save(&self, identity: &StoredIdentity) -> Result<()> {
        *self.identity.lock().await = Some(identity.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.identity.lock().await.take();
        Ok(())
    }
}

/// Resolve the keys for this device.
///
/// An explicit `secret` (nsec or hex) is imported and replaces whatever the
/// store held. Otherwise the stored identity is used, and a fresh one is
/// generated and saved when the store is empty.
pub async fn authenticate(store: &dyn IdentityStore, secret: Option<&str>) -> Result<Keys> {
    if let Some(secret) = secret {
        let keys = Keys::parse(secret)?;
        store.save(&StoredIdentity::from_keys(&keys)?).await?;
        info!("Imported identity {}", keys.public_key());
        return Ok(keys);
    }

    if let Some(stored) = store.load().await? {
        return stored.keys();
    }

    let keys = Keys::generate();
    store.save(&StoredIdentity::from_keys(&keys)?).await?;
    info!("Generated new identity {}", keys.public_key());
    Ok(keys)
}
