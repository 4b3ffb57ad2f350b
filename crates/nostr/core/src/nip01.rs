//! NIP-01: Basic protocol flow description.
//!
//! This module implements the core Nostr event structure and operations:
//! - Event structure (id, pubkey, created_at, kind, tags, content, sig)
//! - Event serialization for hashing
//! - Event signing with Schnorr signatures
//! - Event verification
//! - Kind classification (regular, replaceable, ephemeral, addressable)

use crate::keys::{PublicKey, SecretKey};
use bitcoin::hashes::{Hash, sha256};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{Message, XOnlyPublicKey, schnorr};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during NIP-01 operations.
#[derive(Debug, Error)]
pub enum Nip01Error {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("verification error: {0}")]
    Verification(String),
}

/// A signed Nostr event.
///
/// Fields are public so the record serializes exactly like the wire format,
/// but any change to `kind`, `content`, `tags`, `created_at` or `pubkey`
/// invalidates `id` and `sig`; [`verify_event`] rejects such an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    pub id: String,
    /// 32-bytes lowercase hex-encoded public key of the event creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind (integer between 0 and 65535)
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex signature
    pub sig: String,
}

impl Event {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        tag_value(&self.tags, name)
    }

    /// Second element of every tag named `name`, in order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }

    /// Author key, if `pubkey` is well formed.
    pub fn author(&self) -> Option<PublicKey> {
        PublicKey::from_hex(&self.pubkey).ok()
    }
}

/// An unsigned event (before signing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    /// 32-bytes lowercase hex-encoded public key of the event creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
}

/// A template for creating events (without pubkey, which comes from the signing key).
///
/// # Examples
///
/// ```
/// use nostr::{EventTemplate, KIND_SHORT_TEXT_NOTE};
///
/// let template = EventTemplate::new(KIND_SHORT_TEXT_NOTE, "Hello Nostr!")
///     .with_tag(vec!["t".to_string(), "lesson".to_string()]);
/// assert_eq!(template.tags.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
}

impl EventTemplate {
    /// New template stamped with the current time.
    pub fn new(kind: u16, content: impl Into<String>) -> Self {
        Self {
            created_at: unix_now(),
            kind,
            tags: Vec::new(),
            content: content.into(),
        }
    }

    pub fn with_tag(mut self, tag: Vec<String>) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Vec<String>>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Attach the author's key, producing the form that gets hashed.
    pub fn into_unsigned(self, pubkey: &PublicKey) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: pubkey.to_hex(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }
}

/// Event kind classification according to NIP-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClassification {
    /// Events expected to be stored by relays
    Regular,
    /// Only latest event per pubkey+kind is stored
    Replaceable,
    /// Not expected to be stored by relays
    Ephemeral,
    /// Only latest event per pubkey+kind+d-tag is stored
    Addressable,
    /// Unknown classification
    Unknown,
}

// Standard event kinds
pub const KIND_METADATA: u16 = 0;
pub const KIND_SHORT_TEXT_NOTE: u16 = 1;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Serialize an unsigned event for hashing.
///
/// Format: `[0, pubkey, created_at, kind, tags, content]`
pub fn serialize_event(event: &UnsignedEvent) -> Result<String, Nip01Error> {
    if !validate_unsigned_event(event) {
        return Err(Nip01Error::InvalidEvent(
            "can't serialize event with wrong or missing properties".to_string(),
        ));
    }

    serde_json::to_string(&(
        0,
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    ))
    .map_err(|e| Nip01Error::Serialization(e.to_string()))
}

/// Get the event hash (id) from an unsigned event.
pub fn get_event_hash(event: &UnsignedEvent) -> Result<String, Nip01Error> {
    let serialized = serialize_event(event)?;
    let hash = sha256::Hash::hash(serialized.as_bytes());
    Ok(hex::encode(hash.as_byte_array()))
}

/// Validate an unsigned event structure.
pub fn validate_unsigned_event(event: &UnsignedEvent) -> bool {
    is_lower_hex(&event.pubkey, 64)
}

/// Validate a signed event structure (not including signature verification).
pub fn validate_event(event: &Event) -> bool {
    is_lower_hex(&event.id, 64) && is_lower_hex(&event.pubkey, 64) && is_lower_hex(&event.sig, 128)
}

/// Sign an event template with a secret key, producing a complete signed event.
pub fn finalize_event(template: &EventTemplate, secret_key: &SecretKey) -> Result<Event, Nip01Error> {
    let secp = Secp256k1::new();
    let keypair = secret_key.keypair(&secp);
    let (xonly, _parity) = keypair.x_only_public_key();

    let unsigned = UnsignedEvent {
        pubkey: hex::encode(xonly.serialize()),
        created_at: template.created_at,
        kind: template.kind,
        tags: template.tags.clone(),
        content: template.content.clone(),
    };

    let id = get_event_hash(&unsigned)?;
    let message = id_message(&id).map_err(Nip01Error::Signing)?;
    let sig = secp.sign_schnorr_no_aux_rand(&message, &keypair);

    Ok(Event {
        id,
        pubkey: unsigned.pubkey,
        created_at: unsigned.created_at,
        kind: unsigned.kind,
        tags: unsigned.tags,
        content: unsigned.content,
        sig: hex::encode(sig.serialize()),
    })
}

/// Verify an event's signature and id.
pub fn verify_event(event: &Event) -> Result<bool, Nip01Error> {
    if !validate_event(event) {
        return Ok(false);
    }

    let unsigned = UnsignedEvent {
        pubkey: event.pubkey.clone(),
        created_at: event.created_at,
        kind: event.kind,
        tags: event.tags.clone(),
        content: event.content.clone(),
    };

    if get_event_hash(&unsigned)? != event.id {
        return Ok(false);
    }

    let secp = Secp256k1::verification_only();
    let message = id_message(&event.id).map_err(Nip01Error::Verification)?;

    let sig_bytes = hex::decode(&event.sig)
        .map_err(|e| Nip01Error::Verification(format!("invalid sig hex: {}", e)))?;
    let sig = schnorr::Signature::from_slice(&sig_bytes)
        .map_err(|e| Nip01Error::Verification(format!("invalid signature: {}", e)))?;

    let pubkey_bytes = hex::decode(&event.pubkey)
        .map_err(|e| Nip01Error::Verification(format!("invalid pubkey hex: {}", e)))?;
    let Ok(pubkey) = XOnlyPublicKey::from_slice(&pubkey_bytes) else {
        return Ok(false);
    };

    Ok(secp.verify_schnorr(&sig, &message, &pubkey).is_ok())
}

fn id_message(id: &str) -> Result<Message, String> {
    let bytes: [u8; 32] = hex::decode(id)
        .map_err(|e| format!("invalid id hex: {}", e))?
        .try_into()
        .map_err(|_| "event id must be 32 bytes".to_string())?;
    Ok(Message::from_digest(bytes))
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// First value of the first tag named `name` in a tag list.
pub fn tag_value<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.first().map(String::as_str) == Some(name))
        .and_then(|tag| tag.get(1))
        .map(String::as_str)
}

/// Classify an event kind according to NIP-01 rules.
pub fn classify_kind(kind: u16) -> KindClassification {
    let k = kind as u32;

    if (1000..10000).contains(&k) || (4..45).contains(&k) || k == 1 || k == 2 {
        return KindClassification::Regular;
    }

    if (10000..20000).contains(&k) || k == 0 || k == 3 {
        return KindClassification::Replaceable;
    }

    if (20000..30000).contains(&k) {
        return KindClassification::Ephemeral;
    }

    if (30000..40000).contains(&k) {
        return KindClassification::Addressable;
    }

    KindClassification::Unknown
}

/// Check if a kind is addressable.
pub fn is_addressable_kind(kind: u16) -> bool {
    matches!(classify_kind(kind), KindClassification::Addressable)
}

/// Check if a kind is replaceable.
pub fn is_replaceable_kind(kind: u16) -> bool {
    matches!(classify_kind(kind), KindClassification::Replaceable)
}

/// Sort events in reverse-chronological order by created_at,
/// then by id (lexicographically) in case of ties.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| match b.created_at.cmp(&a.created_at) {
        std::cmp::Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_KEY: &str =
        "d217c1ff2f8a65c3e3a1740db3b9f58b8c848bb45e26d00ed4714e4a0f4ceecf";

    fn test_key() -> SecretKey {
        SecretKey::from_hex(TEST_PRIVATE_KEY).unwrap()
    }

    fn note(content: &str) -> EventTemplate {
        EventTemplate {
            kind: KIND_SHORT_TEXT_NOTE,
            tags: vec![],
            content: content.to_string(),
            created_at: 1617932115,
        }
    }

    #[test]
    fn test_finalize_event_creates_signed_event() {
        let sk = test_key();
        let template = note("Hello, world!");

        let event = finalize_event(&template, &sk).unwrap();

        assert_eq!(event.kind, template.kind);
        assert_eq!(event.content, template.content);
        assert_eq!(event.created_at, template.created_at);
        assert_eq!(event.pubkey, sk.public_key().to_hex());
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.sig.len(), 128);
        assert!(verify_event(&event).unwrap());
    }

    #[test]
    fn test_serialize_event_format() {
        let public_key = test_key().public_key().to_hex();
        let unsigned = note("Hello, world!").into_unsigned(&test_key().public_key());

        let serialized = serialize_event(&unsigned).unwrap();
        let expected = format!("[0,\"{}\",1617932115,1,[],\"Hello, world!\"]", public_key);
        assert_eq!(serialized, expected);
    }

    #[test]
    fn test_serialize_event_invalid_pubkey() {
        let unsigned = UnsignedEvent {
            pubkey: "invalid".to_string(),
            created_at: 1617932115,
            kind: KIND_SHORT_TEXT_NOTE,
            tags: vec![],
            content: "Hello, world!".to_string(),
        };

        assert!(serialize_event(&unsigned).is_err());
    }

    #[test]
    fn test_uppercase_pubkey_rejected() {
        let unsigned = UnsignedEvent {
            pubkey: test_key().public_key().to_hex().to_uppercase(),
            created_at: 1617932115,
            kind: KIND_SHORT_TEXT_NOTE,
            tags: vec![],
            content: "Hello, world!".to_string(),
        };

        assert!(!validate_unsigned_event(&unsigned));
    }

    #[test]
    fn test_tampered_content_fails_verification() {
        let mut event = finalize_event(&note("original"), &test_key()).unwrap();
        event.content = "edited".to_string();
        assert!(!verify_event(&event).unwrap());
    }

    #[test]
    fn test_tampered_signature_fails_verification() {
        let mut event = finalize_event(&note("Hello, world!"), &test_key()).unwrap();
        let mut sig_chars: Vec<char> = event.sig.chars().collect();
        sig_chars[0] = if sig_chars[0] == '6' { '7' } else { '6' };
        event.sig = sig_chars.into_iter().collect();

        assert!(!verify_event(&event).unwrap());
    }

    #[test]
    fn test_wrong_pubkey_fails_verification() {
        let other = SecretKey::from_hex(
            "5b4a34f4e4b23c63ad55a35e3f84a3b53d96dbf266edf521a8358f71d19cbf67",
        )
        .unwrap();

        let mut event = finalize_event(&note("Hello, world!"), &test_key()).unwrap();
        event.pubkey = other.public_key().to_hex();

        assert!(!verify_event(&event).unwrap());
    }

    #[test]
    fn test_event_with_unicode_and_escapes() {
        let sk = test_key();
        for content in ["Hello\nWorld\t\"quotes\" and \\backslash", "Hello 世界 🌍"] {
            let event = finalize_event(&note(content), &sk).unwrap();
            assert!(verify_event(&event).unwrap());
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = finalize_event(
            &note("shape").with_tag(vec!["t".to_string(), "nostr".to_string()]),
            &test_key(),
        )
        .unwrap();

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        for field in ["id", "pubkey", "created_at", "kind", "tags", "content", "sig"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_tag_helpers() {
        let event = finalize_event(
            &note("tags").with_tags(vec![
                vec!["p".to_string(), "a".repeat(64)],
                vec!["p".to_string(), "b".repeat(64)],
                vec!["a".to_string(), "30009:x:y".to_string()],
            ]),
            &test_key(),
        )
        .unwrap();

        assert_eq!(event.tag_value("a"), Some("30009:x:y"));
        assert_eq!(event.tag_values("p").count(), 2);
        assert_eq!(event.tag_value("e"), None);
    }

    #[test]
    fn test_sort_events() {
        let make = |id: &str, created_at: u64| Event {
            id: id.to_string(),
            pubkey: "a".repeat(64),
            created_at,
            kind: 1,
            tags: vec![],
            content: String::new(),
            sig: "a".repeat(128),
        };
        let mut events = vec![
            make("abc123", 1610000000),
            make("abc124", 1620000000),
            make("abc125", 1620000000),
        ];

        sort_events(&mut events);

        assert_eq!(events[0].id, "abc124");
        assert_eq!(events[1].id, "abc125");
        assert_eq!(events[2].id, "abc123");
    }

    #[test]
    fn test_classify_kind() {
        assert_eq!(classify_kind(1), KindClassification::Regular);
        assert_eq!(classify_kind(8), KindClassification::Regular);
        assert_eq!(classify_kind(9321), KindClassification::Regular);
        assert_eq!(classify_kind(0), KindClassification::Replaceable);
        assert_eq!(classify_kind(10019), KindClassification::Replaceable);
        assert_eq!(classify_kind(17375), KindClassification::Replaceable);
        assert_eq!(classify_kind(20000), KindClassification::Ephemeral);
        assert_eq!(classify_kind(30009), KindClassification::Addressable);
        assert_eq!(classify_kind(50000), KindClassification::Unknown);
    }
}
