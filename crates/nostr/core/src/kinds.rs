//! Typed views over the event kinds this crate understands.
//!
//! [`NostrEvent::from_event`] never fails: unknown kinds and records that do
//! not parse as their kind land in [`NostrEvent::Other`] with the raw event
//! kept intact.

use crate::metadata::Metadata;
use crate::nip01::{Event, KIND_METADATA, KIND_SHORT_TEXT_NOTE};
use crate::nip04::ENCRYPTED_DM_KIND;
use crate::nip33::Coordinate;
use crate::nip58::{BadgeAward, BadgeDefinition, KIND_BADGE_AWARD, KIND_BADGE_DEFINITION};
use crate::nip60::WALLET_KIND;
use crate::nip61::{NUTZAP_INFO_KIND, NUTZAP_KIND, Nutzap, NutzapInfo};

#[derive(Debug, Clone, PartialEq)]
pub enum NostrEvent {
    Metadata {
        event: Event,
        metadata: Metadata,
    },
    TextNote(Event),
    /// Content stays encrypted; decrypting needs a signer.
    EncryptedDirectMessage {
        event: Event,
        recipient: String,
    },
    BadgeAward {
        event: Event,
        award: BadgeAward,
    },
    BadgeDefinition {
        event: Event,
        coordinate: Coordinate,
        definition: BadgeDefinition,
    },
    /// Wallet content is sealed to its owner, so only the raw event is kept.
    WalletDefinition(Event),
    NutzapInfo {
        event: Event,
        info: NutzapInfo,
    },
    Nutzap {
        event: Event,
        nutzap: Nutzap,
    },
    Other(Event),
}

impl NostrEvent {
    pub fn from_event(event: Event) -> Self {
        match event.kind {
            KIND_METADATA => match Metadata::from_json(&event.content) {
                Ok(metadata) => Self::Metadata { event, metadata },
                Err(_) => Self::Other(event),
            },
            KIND_SHORT_TEXT_NOTE => Self::TextNote(event),
            ENCRYPTED_DM_KIND => match event.tag_value("p").map(str::to_string) {
                Some(recipient) => Self::EncryptedDirectMessage { event, recipient },
                None => Self::Other(event),
            },
            KIND_BADGE_AWARD => match BadgeAward::from_tags(&event.tags) {
                Ok(award) => Self::BadgeAward { event, award },
                Err(_) => Self::Other(event),
            },
            KIND_BADGE_DEFINITION => {
                let parsed = Coordinate::from_event(&event)
                    .ok()
                    .zip(BadgeDefinition::from_tags(&event.tags).ok());
                match parsed {
                    Some((coordinate, definition)) => Self::BadgeDefinition {
                        event,
                        coordinate,
                        definition,
                    },
                    None => Self::Other(event),
                }
            }
            WALLET_KIND => Self::WalletDefinition(event),
            NUTZAP_INFO_KIND => match NutzapInfo::from_event(&event) {
                Ok(info) => Self::NutzapInfo { event, info },
                Err(_) => Self::Other(event),
            },
            NUTZAP_KIND => match Nutzap::from_event(&event) {
                Ok(nutzap) => Self::Nutzap { event, nutzap },
                Err(_) => Self::Other(event),
            },
            _ => Self::Other(event),
        }
    }

    /// The underlying signed event.
    pub fn event(&self) -> &Event {
        match self {
            Self::Metadata { event, .. }
            | Self::EncryptedDirectMessage { event, .. }
            | Self::BadgeAward { event, .. }
            | Self::BadgeDefinition { event, .. }
            | Self::NutzapInfo { event, .. }
            | Self::Nutzap { event, .. } => event,
            Self::TextNote(event) | Self::WalletDefinition(event) | Self::Other(event) => event,
        }
    }

    pub fn kind(&self) -> u16 {
        self.event().kind
    }

    pub fn into_event(self) -> Event {
        match self {
            Self::Metadata { event, .. }
            | Self::EncryptedDirectMessage { event, .. }
            | Self::BadgeAward { event, .. }
            | Self::BadgeDefinition { event, .. }
            | Self::NutzapInfo { event, .. }
            | Self::Nutzap { event, .. } => event,
            Self::TextNote(event) | Self::WalletDefinition(event) | Self::Other(event) => event,
        }
    }
}

impl From<Event> for NostrEvent {
    fn from(event: Event) -> Self {
        Self::from_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keys;
    use crate::nip01::{EventTemplate, finalize_event};

    fn signed(keys: &Keys, template: EventTemplate) -> Event {
        finalize_event(&template, keys.secret_key()).unwrap()
    }

    #[test]
    fn test_metadata_variant() {
        let keys = Keys::generate();
        let event = signed(&keys, EventTemplate::new(0, r#"{"name":"ada"}"#));
        match NostrEvent::from_event(event) {
            NostrEvent::Metadata { metadata, .. } => {
                assert_eq!(metadata.name.as_deref(), Some("ada"))
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_metadata_falls_back_to_other() {
        let keys = Keys::generate();
        let event = signed(&keys, EventTemplate::new(0, "not json"));
        let typed = NostrEvent::from_event(event.clone());
        assert_eq!(typed, NostrEvent::Other(event));
    }

    #[test]
    fn test_badge_definition_variant() {
        let keys = Keys::generate();
        let definition = BadgeDefinition::new("bravery")
            .with_name("Bravery")
            .with_image("https://example.com/b.png", None);
        let event = signed(
            &keys,
            EventTemplate::new(KIND_BADGE_DEFINITION, "").with_tags(definition.to_tags()),
        );

        let typed = NostrEvent::from_event(event);
        assert_eq!(typed.kind(), KIND_BADGE_DEFINITION);
        match typed {
            NostrEvent::BadgeDefinition { coordinate, .. } => {
                assert_eq!(coordinate.identifier, "bravery");
                assert_eq!(coordinate.pubkey, keys.public_key());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_other() {
        let keys = Keys::generate();
        let event = signed(&keys, EventTemplate::new(1984, "report"));
        let typed = NostrEvent::from(event.clone());
        assert!(matches!(typed, NostrEvent::Other(_)));
        assert_eq!(typed.into_event(), event);
    }
}
