//! NIP-33: Addressable events (now part of NIP-01).
//!
//! For kind `n` such that `30000 <= n < 40000`, events are addressable by
//! their kind, pubkey and `d` tag value. Other events reference them with an
//! `a` tag holding the coordinate:
//!
//! ```text
//! <kind>:<pubkey>:<d-tag-value>
//! ```
//!
//! The same coordinate can also travel as a NIP-19 `naddr`. [`Coordinate::parse`]
//! accepts either notation so callers can treat them as one key.
//!
//! # Usage
//!
//! ```
//! use nostr::Coordinate;
//!
//! let raw = "30009:3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d:bravery";
//! let coordinate = Coordinate::parse(raw).unwrap();
//! assert_eq!(coordinate.kind, 30009);
//! assert_eq!(coordinate.identifier, "bravery");
//! assert_eq!(coordinate.to_string(), raw);
//! ```

use crate::keys::PublicKey;
use crate::nip01::{Event, is_addressable_kind};
use crate::nip19::{self, AddressPointer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tag name for the d-identifier
pub const D_TAG: &str = "d";

/// Tag name for coordinate references
pub const A_TAG: &str = "a";

/// Errors that can occur during NIP-33 operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip33Error {
    #[error("event is not addressable (kind must be 30000-39999)")]
    NotAddressable,

    #[error("missing required d tag")]
    MissingDTag,

    #[error("invalid address format: {0}")]
    InvalidAddress(String),
}

/// Coordinate of an addressable event: `kind:pubkey:identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub kind: u16,
    pub pubkey: PublicKey,
    pub identifier: String,
}

impl Coordinate {
    pub fn new(kind: u16, pubkey: PublicKey, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            pubkey,
            identifier: identifier.into(),
        }
    }

    /// Parse a raw coordinate, an `naddr1…` or a `nostr:naddr1…` string.
    pub fn parse(s: &str) -> Result<Self, Nip33Error> {
        let s = nip19::strip_nostr_uri(s.trim());
        if s.starts_with(nip19::NADDR_HRP) {
            let pointer = nip19::decode_naddr(s)
                .map_err(|e| Nip33Error::InvalidAddress(e.to_string()))?;
            return Self::from_pointer(&pointer);
        }
        parse_address(s)
    }

    /// The coordinate of an addressable event.
    pub fn from_event(event: &Event) -> Result<Self, Nip33Error> {
        if !is_addressable_kind(event.kind) {
            return Err(Nip33Error::NotAddressable);
        }
        let identifier = get_d_tag(event).ok_or(Nip33Error::MissingDTag)?;
        let pubkey = PublicKey::from_hex(&event.pubkey)
            .map_err(|e| Nip33Error::InvalidAddress(e.to_string()))?;
        Ok(Self::new(event.kind, pubkey, identifier))
    }

    fn from_pointer(pointer: &AddressPointer) -> Result<Self, Nip33Error> {
        if !is_addressable_kind(pointer.kind) {
            return Err(Nip33Error::InvalidAddress(format!(
                "kind {} is not addressable",
                pointer.kind
            )));
        }
        let pubkey = PublicKey::from_hex(&pointer.pubkey)
            .map_err(|e| Nip33Error::InvalidAddress(e.to_string()))?;
        Ok(Self::new(pointer.kind, pubkey, pointer.identifier.clone()))
    }

    /// Encode as `naddr`, optionally with relay hints.
    pub fn to_naddr(&self, relays: &[String]) -> Result<String, Nip33Error> {
        nip19::encode_naddr(&AddressPointer {
            identifier: self.identifier.clone(),
            pubkey: self.pubkey.to_hex(),
            kind: self.kind,
            relays: relays.to_vec(),
        })
        .map_err(|e| Nip33Error::InvalidAddress(e.to_string()))
    }

    /// Build an `a` tag referencing this coordinate.
    pub fn to_a_tag(&self, relay_url: Option<&str>) -> Vec<String> {
        let mut tag = vec![A_TAG.to_string(), self.to_string()];
        if let Some(url) = relay_url {
            tag.push(url.to_string());
        }
        tag
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey.to_hex(), self.identifier)
    }
}

impl FromStr for Coordinate {
    type Err = Nip33Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Get the d tag value from an addressable event.
pub fn get_d_tag(event: &Event) -> Option<String> {
    event.tag_value(D_TAG).map(str::to_string)
}

/// Parse a raw `kind:pubkey:identifier` string.
///
/// The identifier may itself contain `:`.
pub fn parse_address(address: &str) -> Result<Coordinate, Nip33Error> {
    let parts: Vec<&str> = address.splitn(3, ':').collect();

    if parts.len() != 3 {
        return Err(Nip33Error::InvalidAddress(
            "address must have format kind:pubkey:dtag".to_string(),
        ));
    }

    let kind = parts[0]
        .parse::<u16>()
        .map_err(|_| Nip33Error::InvalidAddress(format!("invalid kind '{}'", parts[0])))?;

    if !is_addressable_kind(kind) {
        return Err(Nip33Error::InvalidAddress(format!(
            "kind {} is not addressable (must be 30000-39999)",
            kind
        )));
    }

    let pubkey = PublicKey::from_hex(parts[1])
        .map_err(|_| Nip33Error::InvalidAddress("pubkey must be 64 hex characters".to_string()))?;

    Ok(Coordinate::new(kind, pubkey, parts[2]))
}

/// Set the d tag, replacing any existing one.
pub fn set_d_tag(tags: &mut Vec<Vec<String>>, d_tag: &str) {
    tags.retain(|tag| tag.first().map(|s| s.as_str()) != Some(D_TAG));
    tags.push(vec![D_TAG.to_string(), d_tag.to_string()]);
}
