//! Wallet settings

use crate::error::{Result, WalletError};
use nostr::DEFAULT_UNIT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Defaults applied to new wallets and deposits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    /// Mints offered when the user has not picked any
    pub default_mints: Vec<String>,
    /// Unit for new wallets and deposits
    pub unit: String,
    /// How often a pending deposit asks the mint whether it was paid
    pub deposit_poll_interval_ms: u64,
    /// Where the mint client keeps its proof cache; `wallet.redb` in the
    /// config directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_database: Option<PathBuf>,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            default_mints: vec!["https://mint.minibits.cash/Bitcoin".to_string()],
            unit: DEFAULT_UNIT.to_string(),
            deposit_poll_interval_ms: 2_000,
            mint_database: None,
        }
    }
}

impl WalletSettings {
    /// Load from the default path, or defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| WalletError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| WalletError::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// `wallet.toml` next to the Nostr client config.
    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WalletError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join(nostr_client::APP_DIR).join("wallet.toml"))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.mint_database {
            return Ok(path.clone());
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WalletError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join(nostr_client::APP_DIR).join("wallet.redb"))
    }

    pub fn deposit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.deposit_poll_interval_ms.max(1))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.deposit_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = WalletSettings::default();
        assert_eq!(settings.unit, "sat");
        assert_eq!(settings.deposit_poll_interval(), Duration::from_secs(2));
        assert!(!settings.default_mints.is_empty());
    }

    #[test]
    fn test_settings_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.toml");
        let settings = WalletSettings {
            default_mints: vec!["https://mint.example/Bitcoin".into()],
            ..WalletSettings::default()
        }
        .with_poll_interval(Duration::from_millis(250));

        settings.save_to(&path).unwrap();
        assert_eq!(WalletSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: WalletSettings = toml::from_str("unit = \"msat\"").unwrap();
        assert_eq!(settings.unit, "msat");
        assert_eq!(settings.deposit_poll_interval_ms, 2_000);
        assert_eq!(settings.mint_database, None);
    }

    #[test]
    fn test_database_path_override() {
        let settings: WalletSettings =
            toml::from_str("mint_database = \"/tmp/classroom/wallet.redb\"").unwrap();
        assert_eq!(
            settings.database_path().unwrap(),
            PathBuf::from("/tmp/classroom/wallet.redb")
        );
    }
}
