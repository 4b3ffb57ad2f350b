//! Encrypted direct messages (NIP-04).

use crate::error::{ClientError, Result};
use crate::session::NostrSession;
use nostr::{ENCRYPTED_DM_KIND, Event, EventTemplate, PublicKey};
use tracing::warn;

/// Encrypt `plaintext` for `recipient` and publish it as a kind 4 event.
///
/// Returns `false` when no relay acknowledged the message. Fails with
/// [`ClientError::NoSigner`] on a read-only session.
pub async fn send_direct_message(
    session: &NostrSession,
    recipient: &PublicKey,
    plaintext: &str,
) -> Result<bool> {
    let signer = session.signer()?;
    let content = signer.nip04_encrypt(recipient, plaintext).await?;
    let template = EventTemplate::new(ENCRYPTED_DM_KIND, content)
        .with_tag(vec!["p".to_string(), recipient.to_hex()]);

    let outcome = session.publish_template(template).await?;
    if !outcome.is_delivered() {
        warn!("Direct message to {} reached no relay", recipient);
    }
    Ok(outcome.is_delivered())
}

/// Decrypt a kind 4 event addressed to or sent by the session's identity.
pub async fn read_direct_message(session: &NostrSession, event: &Event) -> Result<String> {
    if event.kind != ENCRYPTED_DM_KIND {
        return Err(ClientError::InvalidEvent(format!(
            "event {} is kind {}, not a direct message",
            event.id, event.kind
        )));
    }

    let signer = session.signer()?;
    let me = signer.public_key();
    let author = event
        .author()
        .ok_or_else(|| ClientError::InvalidEvent(format!("event {} has a bad pubkey", event.id)))?;

    let peer = if author == me {
        let recipient = event
            .tag_value("p")
            .ok_or_else(|| ClientError::InvalidEvent(format!("event {} has no recipient", event.id)))?;
        PublicKey::parse(recipient)?
    } else {
        author
    };

    signer.nip04_decrypt(&peer, &event.content).await
}
