//! NIP-60: Cashu Wallets
//!
//! A wallet lives on relays as a replaceable wallet event (kind 17375) whose
//! content is an encrypted array of tags, plus token events (kind 7375) that
//! hold unspent proofs for one mint.
//!
//! Content is encrypted to the wallet owner's own key. This module only
//! builds and parses the plaintext payloads; callers seal them with the
//! signer.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/60.md>

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind for the wallet definition (replaceable)
pub const WALLET_KIND: u16 = 17375;

/// Event kind for unspent token storage
pub const TOKEN_KIND: u16 = 7375;

/// Default unit when none is given
pub const DEFAULT_UNIT: &str = "sat";

/// Errors that can occur during NIP-60 operations
#[derive(Debug, Error)]
pub enum Nip60Error {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A Cashu proof as stored in token events and sent in nutzaps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof {
    pub amount: u64,
    #[serde(rename = "C")]
    pub c: String,
    /// Keyset id
    pub id: String,
    pub secret: String,
}

/// Wallet definition (kind 17375).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletDefinition {
    pub name: Option<String>,
    pub unit: String,
    pub mints: Vec<String>,
    pub relays: Vec<String>,
    /// P2PK private key (hex) used to receive nutzaps; never the Nostr key
    pub privkey: Option<String>,
}

impl WalletDefinition {
    pub fn new(mints: Vec<String>) -> Self {
        Self {
            name: None,
            unit: DEFAULT_UNIT.to_string(),
            mints,
            relays: Vec::new(),
            privkey: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }

    pub fn with_privkey(mut self, privkey_hex: impl Into<String>) -> Self {
        self.privkey = Some(privkey_hex.into());
        self
    }

    /// Plaintext payload: a JSON array of tags.
    pub fn to_content_tags(&self) -> Vec<Vec<String>> {
        let mut tags = Vec::new();
        if let Some(ref privkey) = self.privkey {
            tags.push(vec!["privkey".to_string(), privkey.clone()]);
        }
        if let Some(ref name) = self.name {
            tags.push(vec!["name".to_string(), name.clone()]);
        }
        tags.push(vec!["unit".to_string(), self.unit.clone()]);
        for mint in &self.mints {
            tags.push(vec!["mint".to_string(), mint.clone()]);
        }
        for relay in &self.relays {
            tags.push(vec!["relay".to_string(), relay.clone()]);
        }
        tags
    }

    pub fn to_content(&self) -> Result<String, Nip60Error> {
        Ok(serde_json::to_string(&self.to_content_tags())?)
    }

    pub fn from_content(content: &str) -> Result<Self, Nip60Error> {
        let tags: Vec<Vec<String>> = serde_json::from_str(content)?;
        Self::from_content_tags(&tags)
    }

    pub fn from_content_tags(tags: &[Vec<String>]) -> Result<Self, Nip60Error> {
        let mut wallet = Self::new(Vec::new());

        for tag in tags {
            let (Some(name), Some(value)) = (tag.first(), tag.get(1)) else {
                continue;
            };
            match name.as_str() {
                "privkey" => {
                    if value.len() != 64 || hex::decode(value).is_err() {
                        return Err(Nip60Error::InvalidPrivateKey(
                            "expected 64 hex characters".to_string(),
                        ));
                    }
                    wallet.privkey = Some(value.clone());
                }
                "name" => wallet.name = Some(value.clone()),
                "unit" => wallet.unit = value.clone(),
                "mint" => wallet.mints.push(value.clone()),
                "relay" => wallet.relays.push(value.clone()),
                _ => {}
            }
        }

        if wallet.mints.is_empty() {
            return Err(Nip60Error::MissingField("mint".to_string()));
        }

        Ok(wallet)
    }
}

/// Plaintext payload of a token event (kind 7375).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContent {
    pub mint: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub proofs: Vec<Proof>,
    /// Ids of token events this one replaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub del: Vec<String>,
}

impl TokenContent {
    pub fn new(mint: impl Into<String>, unit: impl Into<String>, proofs: Vec<Proof>) -> Self {
        Self {
            mint: mint.into(),
            unit: unit.into(),
            proofs,
            del: Vec::new(),
        }
    }

    pub fn amount(&self) -> u64 {
        self.proofs
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.amount))
    }
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_definition_content() {
        let wallet = WalletDefinition::new(vec!["https://mint.example/Bitcoin".to_string()])
            .with_name("Classroom")
            .with_relays(vec!["wss://relay.example.com".to_string()])
            .with_privkey("ab".repeat(32));

        let content = wallet.to_content().unwrap();
        let parsed = WalletDefinition::from_content(&content).unwrap();
        assert_eq!(parsed, wallet);
    }

    #[test]
    fn test_wallet_definition_requires_mint() {
        let tags = vec![vec!["unit".to_string(), "sat".to_string()]];
        assert!(matches!(
            WalletDefinition::from_content_tags(&tags),
            Err(Nip60Error::MissingField(_))
        ));
    }

    #[test]
    fn test_wallet_definition_rejects_bad_privkey() {
        let tags = vec![
            vec!["mint".to_string(), "https://mint.example".to_string()],
            vec!["privkey".to_string(), "nothex".to_string()],
        ];
        assert!(matches!(
            WalletDefinition::from_content_tags(&tags),
            Err(Nip60Error::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_token_content_json() {
        let json = r#"{"mint":"https://mint.example","proofs":[{"amount":2,"C":"02aa","id":"00ad","secret":"s1"},{"amount":8,"C":"02bb","id":"00ad","secret":"s2"}]}"#;
        let token: TokenContent = serde_json::from_str(json).unwrap();
        assert_eq!(token.unit, "sat");
        assert_eq!(token.amount(), 10);
        assert!(!serde_json::to_string(&token).unwrap().contains("del"));
    }
}
