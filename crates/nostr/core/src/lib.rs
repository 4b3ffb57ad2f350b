//! Nostr protocol records for the classroom client and wallet.
//!
//! This crate provides:
//! - Keys: x-only public keys, secret keys, hex and bech32 forms
//! - NIP-01: Basic protocol (events, signing, verification)
//! - NIP-04: Encrypted Direct Messages
//! - NIP-19: bech32-encoded keys and addresses (`npub`, `nsec`, `naddr`)
//! - NIP-33: Addressable event coordinates
//! - NIP-58: Badges
//! - NIP-60: Cashu wallet records
//! - NIP-61: Nutzaps
//! - Profile metadata (kind 0) and typed event variants
//!
//! Nothing here performs I/O; relays and signers live in `nostr-client`.

mod keys;
mod kinds;
mod metadata;
mod nip01;
mod nip04;
mod nip19;
mod nip33;
mod nip58;
mod nip60;
mod nip61;

// Keys
pub use keys::{Keys, PublicKey, SecretKey};

// Typed event variants
pub use kinds::NostrEvent;

// Profile metadata
pub use metadata::Metadata;

// NIP-01: Basic protocol
pub use nip01::{
    Event, EventTemplate, KIND_METADATA, KIND_SHORT_TEXT_NOTE, KindClassification, Nip01Error,
    UnsignedEvent, classify_kind, finalize_event, get_event_hash, is_addressable_kind,
    is_replaceable_kind, serialize_event, sort_events, tag_value, unix_now, validate_event,
    validate_unsigned_event, verify_event,
};

// NIP-04: Encrypted Direct Messages
pub use nip04::{ENCRYPTED_DM_KIND, Nip04Error, decrypt, encrypt, encrypt_with_iv, shared_key};

// NIP-19: bech32-encoded entities
pub use nip19::{
    AddressPointer, KeyRole, NADDR_HRP, NOSTR_URI_PREFIX, NPUB_HRP, NSEC_HRP, Nip19Error,
    decode_key, decode_key_as, decode_naddr, encode_key, encode_naddr, strip_nostr_uri,
};

// NIP-33: Addressable event coordinates
pub use nip33::{A_TAG, Coordinate, D_TAG, Nip33Error, get_d_tag, parse_address, set_d_tag};

// NIP-58: Badges
pub use nip58::{
    Badge, BadgeAward, BadgeDefinition, ImageDimensions, KIND_BADGE_AWARD, KIND_BADGE_DEFINITION,
    Nip58Error,
};

// NIP-60: Cashu Wallets
pub use nip60::{DEFAULT_UNIT, Nip60Error, Proof, TOKEN_KIND, TokenContent, WALLET_KIND, WalletDefinition};

// NIP-61: Nutzaps
pub use nip61::{
    MintInfo, NUTZAP_INFO_KIND, NUTZAP_KIND, Nip61Error, Nutzap, NutzapInfo, p2pk_lock,
};
