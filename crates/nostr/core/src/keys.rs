//! Typed secp256k1 keys.
//!
//! [`PublicKey`] and [`SecretKey`] wrap 32 raw bytes and convert losslessly
//! between hex and bech32. Parsing accepts `npub`/`nsec`, the `nostr:` URI
//! form and 64-character hex, so identifiers from any caller normalize to one
//! representation before they reach the relay layer.

use crate::nip19::{self, KeyRole, Nip19Error};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{self, Keypair, XOnlyPublicKey};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An x-only public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Build from raw bytes, checking that they are a valid curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, Nip19Error> {
        XOnlyPublicKey::from_slice(&bytes)
            .map_err(|e| Nip19Error::InvalidKeyFormat(format!("not a curve point: {}", e)))?;
        Ok(Self(bytes))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, Nip19Error> {
        Self::from_bytes(decode_hex32(hex_str)?)
    }

    /// Parse an `npub`, `nostr:npub` or hex public key.
    pub fn parse(s: &str) -> Result<Self, Nip19Error> {
        let s = s.trim();
        if is_hex32(s) {
            return Self::from_hex(s);
        }
        Self::from_bytes(nip19::decode_key_as(s, KeyRole::Public)?)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, the form used inside events and filters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_npub(&self) -> Result<String, Nip19Error> {
        nip19::encode_key(&self.0, KeyRole::Public)
    }

    pub(crate) fn to_secp(self) -> Result<XOnlyPublicKey, secp256k1::Error> {
        XOnlyPublicKey::from_slice(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = Nip19Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A secp256k1 secret key. `Debug` never prints the key material.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretKey(secp256k1::SecretKey);

impl SecretKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(sk) = secp256k1::SecretKey::from_slice(&bytes) {
                return Self(sk);
            }
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, Nip19Error> {
        secp256k1::SecretKey::from_slice(&bytes)
            .map(Self)
            .map_err(|e| Nip19Error::InvalidKeyFormat(format!("invalid secret key: {}", e)))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, Nip19Error> {
        Self::from_bytes(decode_hex32(hex_str)?)
    }

    /// Parse an `nsec`, `nostr:nsec` or hex secret key.
    pub fn parse(s: &str) -> Result<Self, Nip19Error> {
        let s = s.trim();
        if is_hex32(s) {
            return Self::from_hex(s);
        }
        Self::from_bytes(nip19::decode_key_as(s, KeyRole::Secret)?)
    }

    /// Derive the x-only public key.
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        let (xonly, _parity) = self.keypair(&secp).x_only_public_key();
        PublicKey(xonly.serialize())
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.secret_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn to_nsec(&self) -> Result<String, Nip19Error> {
        nip19::encode_key(&self.to_bytes(), KeyRole::Secret)
    }

    pub(crate) fn to_secp(self) -> secp256k1::SecretKey {
        self.0
    }

    pub(crate) fn keypair<C: secp256k1::Signing>(&self, secp: &Secp256k1<C>) -> Keypair {
        Keypair::from_secret_key(secp, &self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl FromStr for SecretKey {
    type Err = Nip19Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A secret key together with its derived public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Keys {
    pub fn new(secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key();
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn generate() -> Self {
        Self::new(SecretKey::generate())
    }

    /// Parse from any accepted secret key encoding.
    pub fn parse(secret: &str) -> Result<Self, Nip19Error> {
        Ok(Self::new(SecretKey::parse(secret)?))
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }
}

fn is_hex32(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn decode_hex32(s: &str) -> Result<[u8; 32], Nip19Error> {
    let bytes =
        hex::decode(s).map_err(|e| Nip19Error::InvalidKeyFormat(format!("invalid hex: {}", e)))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Nip19Error::InvalidKeyFormat(format!("expected 32 bytes, got {}", bytes.len())))
}
