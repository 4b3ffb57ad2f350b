//! Profile metadata (kind 0).

use crate::error::Result;
use crate::lookup::Lookup;
use crate::message::Filter;
use crate::pool::PublishOutcome;
use crate::session::NostrSession;
use crate::subscription::FetchOutcome;
use nostr::{Event, KIND_METADATA, PublicKey};
use tracing::debug;

pub use nostr::Metadata as Profile;

/// Publish `profile` as the session's kind 0 event.
pub async fn publish_profile(session: &NostrSession, profile: &Profile) -> Result<PublishOutcome> {
    session
        .publish(KIND_METADATA, profile.to_json()?, Vec::new())
        .await
}

/// The newest profile `key` published.
pub async fn fetch_profile(session: &NostrSession, key: &PublicKey) -> Lookup<Profile> {
    let filter = Filter::new().kind(KIND_METADATA).author(key);
    match Lookup::<FetchOutcome>::from_fetch(session.fetch(vec![filter]).await) {
        Lookup::Found(outcome) => newest_profile(&outcome.events, key),
        other => other.map(|_| Profile::default()),
    }
}

/// Pick the newest kind 0 event by `key` and parse it.
pub fn newest_profile(events: &[Event], key: &PublicKey) -> Lookup<Profile> {
    let author = key.to_hex();
    let newest = events
        .iter()
        .filter(|e| e.kind == KIND_METADATA && e.pubkey == author)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| b.id.cmp(&a.id)));

    let Some(event) = newest else {
        return Lookup::NotFound;
    };
    match Profile::from_json(&event.content) {
        Ok(profile) => Lookup::Found(profile),
        Err(e) => {
            debug!("Profile event {} has malformed content: {}", event.id, e);
            Lookup::NotFound
        }
    }
}
