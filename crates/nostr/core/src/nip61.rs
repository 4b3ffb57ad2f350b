//! NIP-61: Nutzaps
//!
//! Defines Cashu-based zaps using P2PK-locked tokens. A recipient announces
//! where and how to be paid in a kind 10019 event; the sender publishes the
//! locked proofs in a kind 9321 event.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/61.md>

use crate::Event;
use crate::nip60::{DEFAULT_UNIT, Proof};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind for nutzap informational event
pub const NUTZAP_INFO_KIND: u16 = 10019;

/// Event kind for nutzap (ecash transfer)
pub const NUTZAP_KIND: u16 = 9321;

/// Errors that can occur during NIP-61 operations
#[derive(Debug, Error)]
pub enum Nip61Error {
    #[error("invalid event kind: expected {expected}, got {actual}")]
    InvalidKind { expected: u16, actual: u16 },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid proof format: {0}")]
    InvalidProof(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mint information with supported units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    pub url: String,
    pub units: Vec<String>,
}

impl MintInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            units: vec![DEFAULT_UNIT.to_string()],
        }
    }

    pub fn with_units(mut self, units: Vec<String>) -> Self {
        self.units = units;
        self
    }

    pub fn supports_unit(&self, unit: &str) -> bool {
        self.units.iter().any(|u| u == unit)
    }
}

/// How a user wants to receive nutzaps (kind 10019).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NutzapInfo {
    pub relays: Vec<String>,
    pub mints: Vec<MintInfo>,
    /// P2PK public key tokens must be locked to (hex, may carry a 02/03 prefix)
    pub pubkey: String,
}

impl NutzapInfo {
    pub fn new(pubkey: impl Into<String>) -> Self {
        Self {
            relays: Vec::new(),
            mints: Vec::new(),
            pubkey: pubkey.into(),
        }
    }

    pub fn with_relay(mut self, relay: impl Into<String>) -> Self {
        self.relays.push(relay.into());
        self
    }

    pub fn with_mint(mut self, mint: MintInfo) -> Self {
        self.mints.push(mint);
        self
    }

    pub fn from_event(event: &Event) -> Result<Self, Nip61Error> {
        if event.kind != NUTZAP_INFO_KIND {
            return Err(Nip61Error::InvalidKind {
                expected: NUTZAP_INFO_KIND,
                actual: event.kind,
            });
        }

        let mut relays = Vec::new();
        let mut mints = Vec::new();
        let mut pubkey = None;

        for tag in &event.tags {
            let (Some(name), Some(value)) = (tag.first(), tag.get(1)) else {
                continue;
            };
            match name.as_str() {
                "relay" => relays.push(value.clone()),
                "mint" => {
                    let mint = MintInfo::new(value.clone());
                    mints.push(if tag.len() > 2 {
                        mint.with_units(tag[2..].to_vec())
                    } else {
                        mint
                    });
                }
                "pubkey" => pubkey = Some(value.clone()),
                _ => {}
            }
        }

        let pubkey = pubkey.ok_or_else(|| Nip61Error::MissingField("pubkey".to_string()))?;

        Ok(Self {
            relays,
            mints,
            pubkey,
        })
    }

    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = Vec::new();
        for relay in &self.relays {
            tags.push(vec!["relay".to_string(), relay.clone()]);
        }
        for mint in &self.mints {
            let mut tag = vec!["mint".to_string(), mint.url.clone()];
            tag.extend(mint.units.iter().cloned());
            tags.push(tag);
        }
        tags.push(vec!["pubkey".to_string(), self.pubkey.clone()]);
        tags
    }

    /// Check if a mint URL is trusted by this user
    pub fn trusts_mint(&self, mint_url: &str) -> bool {
        self.mints.iter().any(|m| m.url == mint_url)
    }

    /// P2PK lock in compressed SEC form (`02` prefix added to x-only keys).
    pub fn p2pk_lock(&self) -> String {
        p2pk_lock(&self.pubkey)
    }
}

/// Normalize a P2PK public key to compressed SEC hex.
pub fn p2pk_lock(pubkey_hex: &str) -> String {
    if pubkey_hex.len() == 64 {
        format!("02{}", pubkey_hex)
    } else {
        pubkey_hex.to_string()
    }
}

/// Nutzap event (kind 9321)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nutzap {
    pub proofs: Vec<Proof>,
    pub mint_url: String,
    pub unit: String,
    pub recipient_pubkey: String,
    pub comment: String,
    pub nutzapped_event: Option<String>,
}

impl Nutzap {
    pub fn new(
        proofs: Vec<Proof>,
        mint_url: impl Into<String>,
        unit: impl Into<String>,
        recipient_pubkey: impl Into<String>,
    ) -> Self {
        Self {
            proofs,
            mint_url: mint_url.into(),
            unit: unit.into(),
            recipient_pubkey: recipient_pubkey.into(),
            comment: String::new(),
            nutzapped_event: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn from_event(event: &Event) -> Result<Self, Nip61Error> {
        if event.kind != NUTZAP_KIND {
            return Err(Nip61Error::InvalidKind {
                expected: NUTZAP_KIND,
                actual: event.kind,
            });
        }

        let mut proofs = Vec::new();
        let mut mint_url = None;
        let mut unit = DEFAULT_UNIT.to_string();
        let mut recipient_pubkey = None;
        let mut nutzapped_event = None;

        for tag in &event.tags {
            let (Some(name), Some(value)) = (tag.first(), tag.get(1)) else {
                continue;
            };
            match name.as_str() {
                "proof" => {
                    let proof: Proof = serde_json::from_str(value)
                        .map_err(|e| Nip61Error::InvalidProof(e.to_string()))?;
                    proofs.push(proof);
                }
                "u" => mint_url = Some(value.clone()),
                "unit" => unit = value.clone(),
                "p" => recipient_pubkey = Some(value.clone()),
                "e" => nutzapped_event = Some(value.clone()),
                _ => {}
            }
        }

        let mint_url =
            mint_url.ok_or_else(|| Nip61Error::MissingField("u (mint url)".to_string()))?;
        let recipient_pubkey = recipient_pubkey
            .ok_or_else(|| Nip61Error::MissingField("p (recipient pubkey)".to_string()))?;

        if proofs.is_empty() {
            return Err(Nip61Error::MissingField("proof".to_string()));
        }

        Ok(Self {
            proofs,
            mint_url,
            unit,
            recipient_pubkey,
            comment: event.content.clone(),
            nutzapped_event,
        })
    }

    pub fn to_tags(&self) -> Result<Vec<Vec<String>>, Nip61Error> {
        let mut tags = Vec::new();
        for proof in &self.proofs {
            tags.push(vec!["proof".to_string(), serde_json::to_string(proof)?]);
        }
        tags.push(vec!["u".to_string(), self.mint_url.clone()]);
        tags.push(vec!["unit".to_string(), self.unit.clone()]);
        tags.push(vec!["amount".to_string(), self.total_amount().to_string()]);
        tags.push(vec!["p".to_string(), self.recipient_pubkey.clone()]);
        if let Some(ref event_id) = self.nutzapped_event {
            tags.push(vec!["e".to_string(), event_id.clone()]);
        }
        Ok(tags)
    }

    pub fn total_amount(&self) -> u64 {
        self.proofs
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.amount))
    }

    /// Validate the nutzap against recipient's NutzapInfo
    pub fn is_acceptable_to(&self, recipient_info: &NutzapInfo) -> bool {
        recipient_info
            .mints
            .iter()
            .any(|m| m.url == self.mint_url && m.supports_unit(&self.unit))
    }
}
