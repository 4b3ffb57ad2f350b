//! NIP-19: bech32-encoded entities.
//!
//! Covers the three entities the client exchanges with callers:
//! - `npub` / `nsec`: bare 32-byte public and secret keys
//! - `naddr`: a TLV-encoded pointer to an addressable event
//!
//! Decoding a key never guesses: a bad checksum, an unknown prefix or a
//! payload that is not exactly 32 bytes is rejected with
//! [`Nip19Error::InvalidKeyFormat`].
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/19.md>

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use thiserror::Error;

/// Human-readable prefix for public keys
pub const NPUB_HRP: &str = "npub";

/// Human-readable prefix for secret keys
pub const NSEC_HRP: &str = "nsec";

/// Human-readable prefix for addressable event pointers
pub const NADDR_HRP: &str = "naddr";

/// URI scheme accepted in front of any bech32 entity (NIP-21)
pub const NOSTR_URI_PREFIX: &str = "nostr:";

const TLV_SPECIAL: u8 = 0;
const TLV_RELAY: u8 = 1;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

/// Errors that can occur during NIP-19 operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip19Error {
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("bech32 encoding error: {0}")]
    Bech32Encode(String),

    #[error("invalid naddr: {0}")]
    InvalidAddressPointer(String),
}

/// Which half of a key pair a 32-byte value represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Public,
    Secret,
}

impl KeyRole {
    /// The bech32 prefix used for this role.
    pub fn hrp(&self) -> &'static str {
        match self {
            KeyRole::Public => NPUB_HRP,
            KeyRole::Secret => NSEC_HRP,
        }
    }

    fn from_hrp(hrp: &str) -> Option<Self> {
        match hrp {
            NPUB_HRP => Some(KeyRole::Public),
            NSEC_HRP => Some(KeyRole::Secret),
            _ => None,
        }
    }
}

/// Decode an `npub` or `nsec` string into its raw bytes and role.
///
/// # Example
///
/// ```
/// use nostr::{KeyRole, decode_key, encode_key};
///
/// let npub = encode_key(&[7u8; 32], KeyRole::Public).unwrap();
/// let (bytes, role) = decode_key(&npub).unwrap();
/// assert_eq!(bytes, [7u8; 32]);
/// assert_eq!(role, KeyRole::Public);
/// ```
pub fn decode_key(encoded: &str) -> Result<([u8; 32], KeyRole), Nip19Error> {
    let encoded = strip_nostr_uri(encoded.trim());
    let (hrp, data) = decode_bech32(encoded)
        .map_err(|e| Nip19Error::InvalidKeyFormat(format!("bech32 decode failed: {}", e)))?;

    let role = KeyRole::from_hrp(&hrp).ok_or_else(|| {
        Nip19Error::InvalidKeyFormat(format!("expected npub or nsec prefix, got '{}'", hrp))
    })?;

    let bytes: [u8; 32] = data.as_slice().try_into().map_err(|_| {
        Nip19Error::InvalidKeyFormat(format!("expected 32 bytes, got {}", data.len()))
    })?;

    Ok((bytes, role))
}

/// Decode a key and require a particular role.
pub fn decode_key_as(encoded: &str, expected: KeyRole) -> Result<[u8; 32], Nip19Error> {
    let (bytes, role) = decode_key(encoded)?;
    if role != expected {
        return Err(Nip19Error::InvalidKeyFormat(format!(
            "expected {} but got {}",
            expected.hrp(),
            role.hrp()
        )));
    }
    Ok(bytes)
}

/// Encode 32 raw key bytes as `npub` or `nsec`.
pub fn encode_key(bytes: &[u8; 32], role: KeyRole) -> Result<String, Nip19Error> {
    encode_bech32(role.hrp(), bytes)
}

/// Pointer to an addressable event (`naddr`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPointer {
    pub identifier: String,
    /// Author public key, lowercase hex
    pub pubkey: String,
    pub kind: u16,
    pub relays: Vec<String>,
}

/// Encode an addressable event pointer as `naddr`.
pub fn encode_naddr(pointer: &AddressPointer) -> Result<String, Nip19Error> {
    let author = hex::decode(&pointer.pubkey)
        .map_err(|e| Nip19Error::Bech32Encode(format!("invalid author hex: {}", e)))?;
    if author.len() != 32 {
        return Err(Nip19Error::Bech32Encode(format!(
            "author must be 32 bytes, got {}",
            author.len()
        )));
    }

    let mut tlv = Vec::new();
    push_tlv(&mut tlv, TLV_SPECIAL, pointer.identifier.as_bytes())?;
    for relay in &pointer.relays {
        push_tlv(&mut tlv, TLV_RELAY, relay.as_bytes())?;
    }
    push_tlv(&mut tlv, TLV_AUTHOR, &author)?;
    push_tlv(&mut tlv, TLV_KIND, &u32::from(pointer.kind).to_be_bytes())?;

    encode_bech32(NADDR_HRP, &tlv)
}

/// Decode an `naddr` string (with or without the `nostr:` prefix).
pub fn decode_naddr(encoded: &str) -> Result<AddressPointer, Nip19Error> {
    let encoded = strip_nostr_uri(encoded.trim());
    let (hrp, data) = decode_bech32(encoded)
        .map_err(|e| Nip19Error::InvalidAddressPointer(format!("bech32 decode failed: {}", e)))?;

    if hrp != NADDR_HRP {
        return Err(Nip19Error::InvalidAddressPointer(format!(
            "expected naddr prefix, got '{}'",
            hrp
        )));
    }

    let mut identifier = None;
    let mut pubkey = None;
    let mut kind = None;
    let mut relays = Vec::new();

    let mut rest = data.as_slice();
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(Nip19Error::InvalidAddressPointer(
                "truncated TLV header".to_string(),
            ));
        }
        let (t, len) = (rest[0], rest[1] as usize);
        let value = rest.get(2..2 + len).ok_or_else(|| {
            Nip19Error::InvalidAddressPointer(format!("TLV type {} overruns payload", t))
        })?;

        match t {
            TLV_SPECIAL => {
                identifier = Some(String::from_utf8(value.to_vec()).map_err(|_| {
                    Nip19Error::InvalidAddressPointer("identifier is not utf-8".to_string())
                })?);
            }
            TLV_RELAY => {
                if let Ok(relay) = String::from_utf8(value.to_vec()) {
                    relays.push(relay);
                }
            }
            TLV_AUTHOR => {
                if value.len() != 32 {
                    return Err(Nip19Error::InvalidAddressPointer(format!(
                        "author must be 32 bytes, got {}",
                        value.len()
                    )));
                }
                pubkey = Some(hex::encode(value));
            }
            TLV_KIND => {
                let raw: [u8; 4] = value.try_into().map_err(|_| {
                    Nip19Error::InvalidAddressPointer("kind must be 4 bytes".to_string())
                })?;
                let raw = u32::from_be_bytes(raw);
                kind = Some(u16::try_from(raw).map_err(|_| {
                    Nip19Error::InvalidAddressPointer(format!("kind {} out of range", raw))
                })?);
            }
            // Unknown TLV types are skipped
            _ => {}
        }

        rest = &rest[2 + len..];
    }

    Ok(AddressPointer {
        identifier: identifier
            .ok_or_else(|| Nip19Error::InvalidAddressPointer("missing identifier".to_string()))?,
        pubkey: pubkey
            .ok_or_else(|| Nip19Error::InvalidAddressPointer("missing author".to_string()))?,
        kind: kind.ok_or_else(|| Nip19Error::InvalidAddressPointer("missing kind".to_string()))?,
        relays,
    })
}

/// Strip a leading `nostr:` URI scheme if present.
pub fn strip_nostr_uri(s: &str) -> &str {
    s.strip_prefix(NOSTR_URI_PREFIX).unwrap_or(s)
}

fn push_tlv(out: &mut Vec<u8>, t: u8, value: &[u8]) -> Result<(), Nip19Error> {
    let len = u8::try_from(value.len()).map_err(|_| {
        Nip19Error::Bech32Encode(format!("TLV type {} value longer than 255 bytes", t))
    })?;
    out.push(t);
    out.push(len);
    out.extend_from_slice(value);
    Ok(())
}

/// Decode with the original bech32 checksum only. NIP-19 entities are never
/// bech32m, so a bech32m string is a checksum failure here.
fn decode_bech32(encoded: &str) -> Result<(String, Vec<u8>), String> {
    let checked = CheckedHrpstring::new::<Bech32>(encoded).map_err(|e| e.to_string())?;
    Ok((checked.hrp().to_lowercase(), checked.byte_iter().collect()))
}

fn encode_bech32(hrp: &str, data: &[u8]) -> Result<String, Nip19Error> {
    let hrp = Hrp::parse(hrp).map_err(|e| Nip19Error::Bech32Encode(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| Nip19Error::Bech32Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIP-19 reference vectors
    const NPUB: &str = "npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg";
    const NPUB_HEX: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";
    const NSEC: &str = "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";
    const NSEC_HEX: &str = "67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa";

    #[test]
    fn test_decode_npub_vector() {
        let (bytes, role) = decode_key(NPUB).unwrap();
        assert_eq!(hex::encode(bytes), NPUB_HEX);
        assert_eq!(role, KeyRole::Public);
    }

    #[test]
    fn test_decode_nsec_vector() {
        let (bytes, role) = decode_key(NSEC).unwrap();
        assert_eq!(hex::encode(bytes), NSEC_HEX);
        assert_eq!(role, KeyRole::Secret);
    }

    #[test]
    fn test_key_roundtrip() {
        for encoded in [NPUB, NSEC] {
            let (bytes, role) = decode_key(encoded).unwrap();
            assert_eq!(encode_key(&bytes, role).unwrap(), encoded);
        }
    }

    #[test]
    fn test_decode_accepts_nostr_uri() {
        let (bytes, _) = decode_key(&format!("nostr:{}", NPUB)).unwrap();
        assert_eq!(hex::encode(bytes), NPUB_HEX);
    }

    #[test]
    fn test_decode_bad_checksum() {
        let mut corrupted = NPUB.to_string();
        corrupted.pop();
        corrupted.push('q');
        assert!(matches!(
            decode_key(&corrupted),
            Err(Nip19Error::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bech32m_checksum() {
        let hrp = Hrp::parse(NPUB_HRP).unwrap();
        let (bytes, _) = decode_key(NPUB).unwrap();
        let bech32m = bech32::encode::<bech32::Bech32m>(hrp, &bytes).unwrap();
        assert_ne!(bech32m, NPUB);
        assert!(matches!(
            decode_key(&bech32m),
            Err(Nip19Error::InvalidKeyFormat(_))
        ));

        let naddr_hrp = Hrp::parse(NADDR_HRP).unwrap();
        let pointer = bech32::encode::<bech32::Bech32m>(naddr_hrp, &[0, 1, b'x']).unwrap();
        assert!(matches!(
            decode_naddr(&pointer),
            Err(Nip19Error::InvalidAddressPointer(_))
        ));
    }

    #[test]
    fn test_decode_wrong_hrp() {
        let note = encode_bech32("note", &[1u8; 32]).unwrap();
        assert!(matches!(
            decode_key(&note),
            Err(Nip19Error::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_decode_wrong_length() {
        let short = encode_bech32(NPUB_HRP, &[1u8; 20]).unwrap();
        assert!(matches!(
            decode_key(&short),
            Err(Nip19Error::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_decode_key_as_role_mismatch() {
        assert!(decode_key_as(NSEC, KeyRole::Public).is_err());
        assert!(decode_key_as(NPUB, KeyRole::Public).is_ok());
    }

    #[test]
    fn test_naddr_roundtrip() {
        let pointer = AddressPointer {
            identifier: "first-lesson".to_string(),
            pubkey: NPUB_HEX.to_string(),
            kind: 30009,
            relays: vec!["wss://relay.example.com".to_string()],
        };

        let naddr = encode_naddr(&pointer).unwrap();
        assert!(naddr.starts_with("naddr1"));

        let decoded = decode_naddr(&naddr).unwrap();
        assert_eq!(decoded, pointer);
    }

    #[test]
    fn test_decode_naddr_rejects_npub() {
        assert!(matches!(
            decode_naddr(NPUB),
            Err(Nip19Error::InvalidAddressPointer(_))
        ));
    }
}
