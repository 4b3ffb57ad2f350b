//! Badge queries (NIP-58).
//!
//! A user's badges are the kind 8 awards that tag them, joined to the
//! kind 30009 definitions those awards point at.

use crate::error::{ClientError, Result};
use crate::lookup::Lookup;
use crate::message::Filter;
use crate::pool::PublishOutcome;
use crate::session::NostrSession;
use crate::subscription::{FetchOutcome, StopReason};
use nostr::{
    Badge, BadgeAward, BadgeDefinition, Coordinate, Event, EventTemplate, KIND_BADGE_AWARD,
    KIND_BADGE_DEFINITION, PublicKey,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Address of a badge definition; accepts raw coordinates and `naddr`.
pub type BadgeAddress = Coordinate;

/// Badges awarded to `subject`, one per distinct definition address.
///
/// Awards whose definition cannot be found, or whose definition lacks a
/// name or image, are left out.
pub async fn fetch_user_badges(session: &NostrSession, subject: &PublicKey) -> Lookup<Vec<Badge>> {
    let awards_filter = Filter::new()
        .kind(KIND_BADGE_AWARD)
        .pubkey_refs(vec![subject.to_hex()]);
    let fetched = session.fetch(vec![awards_filter]).await;
    let awards = match Lookup::<FetchOutcome>::from_fetch(fetched) {
        Lookup::Found(outcome) => outcome.events,
        other => return other.map(|_| Vec::new()),
    };

    let addresses = award_addresses(&awards, subject);
    if addresses.is_empty() {
        return Lookup::NotFound;
    }

    let filters = addresses
        .iter()
        .map(|address| {
            Filter::new()
                .kind(KIND_BADGE_DEFINITION)
                .author(&address.pubkey)
                .identifiers(vec![address.identifier.clone()])
        })
        .collect();
    let outcome = match session.fetch(filters).await {
        Ok(outcome) => outcome,
        Err(e) => return Lookup::NetworkError(e.to_string()),
    };
    let timed_out = outcome.stop == StopReason::HardTimeout;

    let badges = join_definitions(&addresses, &outcome.events);
    if !badges.is_empty() {
        Lookup::Found(badges)
    } else if timed_out {
        Lookup::Timeout
    } else {
        Lookup::NotFound
    }
}

/// Unique badge definition addresses referenced by awards to `subject`, in
/// first-seen order.
pub fn award_addresses(awards: &[Event], subject: &PublicKey) -> Vec<BadgeAddress> {
    let subject_hex = subject.to_hex();
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();

    for award in awards {
        if award.kind != KIND_BADGE_AWARD || !award.tag_values("p").any(|p| p == subject_hex) {
            debug!("Skipping event {}: not an award to {}", award.id, subject_hex);
            continue;
        }
        for raw in award.tag_values("a") {
            let address = match BadgeAddress::parse(raw) {
                Ok(address) if address.kind == KIND_BADGE_DEFINITION => address,
                Ok(address) => {
                    debug!("Award {} points at kind {}, not a badge", award.id, address.kind);
                    continue;
                }
                Err(e) => {
                    debug!("Award {} has unparseable address {:?}: {}", award.id, raw, e);
                    continue;
                }
            };
            if seen.insert(address.clone()) {
                addresses.push(address);
            }
        }
    }

    addresses
}

/// Join addresses to the newest matching definition event.
pub fn join_definitions(addresses: &[BadgeAddress], definitions: &[Event]) -> Vec<Badge> {
    let mut newest: HashMap<Coordinate, &Event> = HashMap::new();
    for event in definitions {
        let Ok(address) = Coordinate::from_event(event) else {
            debug!("Skipping definition {} without a usable address", event.id);
            continue;
        };
        if address.kind != KIND_BADGE_DEFINITION {
            continue;
        }
        let replace = newest
            .get(&address)
            .is_none_or(|current| event.created_at > current.created_at);
        if replace {
            newest.insert(address, event);
        }
    }

    let mut badges = Vec::with_capacity(addresses.len());
    for address in addresses {
        let Some(event) = newest.get(address) else {
            debug!("No definition found for badge {}", address);
            continue;
        };
        let joined = BadgeDefinition::from_tags(&event.tags)
            .and_then(|definition| Badge::from_definition(address, &definition));
        match joined {
            Ok(badge) => badges.push(badge),
            Err(e) => debug!("Dropping badge {}: {}", address, e),
        }
    }
    badges
}

/// Publish a badge definition as the issuer and return its address.
pub async fn create_badge_definition(
    issuer: &NostrSession,
    definition: &BadgeDefinition,
) -> Result<(BadgeAddress, PublishOutcome)> {
    let pubkey = issuer.signer()?.public_key();
    let template = EventTemplate::new(KIND_BADGE_DEFINITION, "").with_tags(definition.to_tags());
    let outcome = issuer.publish_template(template).await?;
    let address = Coordinate::new(KIND_BADGE_DEFINITION, pubkey, definition.identifier.clone());
    Ok((address, outcome))
}

/// Award a badge the issuer defined to each of `recipients`.
pub async fn award_badge(
    issuer: &NostrSession,
    address: &BadgeAddress,
    recipients: &[PublicKey],
) -> Result<PublishOutcome> {
    let pubkey = issuer.signer()?.public_key();
    if address.kind != KIND_BADGE_DEFINITION {
        return Err(ClientError::InvalidEvent(format!(
            "{} is not a badge definition",
            address
        )));
    }
    if address.pubkey != pubkey {
        return Err(ClientError::InvalidEvent(format!(
            "badge {} belongs to another issuer",
            address
        )));
    }
    if recipients.is_empty() {
        return Err(ClientError::InvalidEvent("award has no recipients".into()));
    }

    let award = recipients
        .iter()
        .fold(BadgeAward::new(address), |award, pk| award.add_recipient(pk, None));
    issuer
        .publish_template(EventTemplate::new(KIND_BADGE_AWARD, "").with_tags(award.to_tags()))
        .await
}
