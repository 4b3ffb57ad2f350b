//! NIP-04: Encrypted Direct Message.
//!
//! The shared key is the raw x-coordinate of ECDH(sender secret, recipient
//! public key); it is not hashed. Content is AES-256-CBC with PKCS#7 padding
//! and a random 16-byte IV, transported as `base64(ciphertext)?iv=base64(iv)`.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/04.md>

use crate::keys::{PublicKey, SecretKey};
use aes::Aes256;
use base64::engine::{Engine, general_purpose};
use bitcoin::secp256k1::Parity;
use bitcoin::secp256k1::ecdh::shared_secret_point;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use thiserror::Error;

/// Event kind for encrypted direct messages
pub const ENCRYPTED_DM_KIND: u16 = 4;

const IV_SEPARATOR: &str = "?iv=";

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Errors that can occur during NIP-04 operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip04Error {
    #[error("invalid content format: expected <base64>?iv=<base64>")]
    InvalidContentFormat,

    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("decryption failed: wrong key or corrupted ciphertext")]
    Decryption,

    #[error("decrypted content is not utf-8")]
    Utf8,
}

/// Compute the NIP-04 shared key between our secret key and a peer.
pub fn shared_key(secret_key: &SecretKey, peer: &PublicKey) -> Result<[u8; 32], Nip04Error> {
    let xonly = peer
        .to_secp()
        .map_err(|e| Nip04Error::InvalidPublicKey(e.to_string()))?;
    // Either parity yields the same x-coordinate
    let point = shared_secret_point(&xonly.public_key(Parity::Even), &secret_key.to_secp());

    let mut key = [0u8; 32];
    key.copy_from_slice(&point[..32]);
    Ok(key)
}

/// Encrypt `plaintext` for `peer`.
pub fn encrypt(
    secret_key: &SecretKey,
    peer: &PublicKey,
    plaintext: &str,
) -> Result<String, Nip04Error> {
    let mut iv = [0u8; 16];
    rand::rng().fill_bytes(&mut iv);
    encrypt_with_iv(secret_key, peer, plaintext, iv)
}

/// Encrypt with a caller-chosen IV.
pub fn encrypt_with_iv(
    secret_key: &SecretKey,
    peer: &PublicKey,
    plaintext: &str,
    iv: [u8; 16],
) -> Result<String, Nip04Error> {
    let key = shared_key(secret_key, peer)?;
    let ciphertext =
        Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}{}{}",
        general_purpose::STANDARD.encode(ciphertext),
        IV_SEPARATOR,
        general_purpose::STANDARD.encode(iv)
    ))
}

/// Decrypt content produced by [`encrypt`] (by either side of the conversation).
pub fn decrypt(
    secret_key: &SecretKey,
    peer: &PublicKey,
    content: &str,
) -> Result<String, Nip04Error> {
    let (ciphertext, iv) = content
        .split_once(IV_SEPARATOR)
        .ok_or(Nip04Error::InvalidContentFormat)?;

    let ciphertext = general_purpose::STANDARD
        .decode(ciphertext)
        .map_err(|e| Nip04Error::Base64Decode(e.to_string()))?;
    let iv: [u8; 16] = general_purpose::STANDARD
        .decode(iv)
        .map_err(|e| Nip04Error::Base64Decode(e.to_string()))?
        .try_into()
        .map_err(|_| Nip04Error::InvalidContentFormat)?;

    let key = shared_key(secret_key, peer)?;
    let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Nip04Error::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| Nip04Error::Utf8)
}
