//! NIP-58: Badges
//!
//! Implements badge definitions and awards, plus the joined [`Badge`] view a
//! profile displays.
//!
//! Features:
//! - Badge Definition (kind 30009): Define reusable badges with images
//! - Badge Award (kind 8): Award badges to users
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/58.md>

use crate::keys::PublicKey;
use crate::nip33::Coordinate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind for badge definitions (addressable)
pub const KIND_BADGE_DEFINITION: u16 = 30009;

/// Event kind for badge awards
pub const KIND_BADGE_AWARD: u16 = 8;

/// Errors that can occur during NIP-58 operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip58Error {
    #[error("missing required tag: {0}")]
    MissingTag(String),

    #[error("invalid tag format: {0}")]
    InvalidTagFormat(String),

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("badge definition {address} has no {field}")]
    Incomplete { address: String, field: &'static str },
}

/// Image dimensions (width x height in pixels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse from "widthxheight" string
    pub fn parse(s: &str) -> Result<Self, Nip58Error> {
        let (width, height) = s.split_once('x').ok_or_else(|| {
            Nip58Error::InvalidDimensions(format!("expected WIDTHxHEIGHT format, got '{}'", s))
        })?;

        let width: u32 = width
            .parse()
            .map_err(|_| Nip58Error::InvalidDimensions(format!("invalid width: {}", width)))?;
        let height: u32 = height
            .parse()
            .map_err(|_| Nip58Error::InvalidDimensions(format!("invalid height: {}", height)))?;

        Ok(Self { width, height })
    }
}

impl std::fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Badge definition (kind 30009)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    /// Unique identifier (d tag)
    pub identifier: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// High-resolution image URL
    pub image: Option<String>,
    pub image_dimensions: Option<ImageDimensions>,
    /// Thumbnail URLs with optional dimensions
    pub thumbnails: Vec<(String, Option<ImageDimensions>)>,
}

impl BadgeDefinition {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
            description: None,
            image: None,
            image_dimensions: None,
            thumbnails: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>, dimensions: Option<ImageDimensions>) -> Self {
        self.image = Some(url.into());
        self.image_dimensions = dimensions;
        self
    }

    pub fn add_thumbnail(mut self, url: impl Into<String>, dimensions: Option<ImageDimensions>) -> Self {
        self.thumbnails.push((url.into(), dimensions));
        self
    }

    /// Convert to event tags
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = vec![vec!["d".to_string(), self.identifier.clone()]];

        if let Some(ref name) = self.name {
            tags.push(vec!["name".to_string(), name.clone()]);
        }

        if let Some(ref desc) = self.description {
            tags.push(vec!["description".to_string(), desc.clone()]);
        }

        if let Some(ref url) = self.image {
            let mut tag = vec!["image".to_string(), url.clone()];
            if let Some(dims) = self.image_dimensions {
                tag.push(dims.to_string());
            }
            tags.push(tag);
        }

        for (url, dims) in &self.thumbnails {
            let mut tag = vec!["thumb".to_string(), url.clone()];
            if let Some(dims) = dims {
                tag.push(dims.to_string());
            }
            tags.push(tag);
        }

        tags
    }

    /// Parse from event tags
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, Nip58Error> {
        let mut definition: Option<Self> = None;
        let mut rest = Vec::new();

        for tag in tags {
            match tag.first().map(String::as_str) {
                Some("d") => {
                    let identifier = tag.get(1).ok_or_else(|| {
                        Nip58Error::InvalidTagFormat("d tag requires identifier".to_string())
                    })?;
                    definition = Some(Self::new(identifier.clone()));
                }
                Some(_) => rest.push(tag),
                None => {}
            }
        }

        let mut definition =
            definition.ok_or_else(|| Nip58Error::MissingTag("d tag required".to_string()))?;

        for tag in rest {
            let Some(value) = tag.get(1) else {
                continue;
            };
            // Malformed dimensions are dropped rather than failing the definition
            let dims = tag.get(2).and_then(|d| ImageDimensions::parse(d).ok());
            match tag[0].as_str() {
                "name" => definition.name = Some(value.clone()),
                "description" => definition.description = Some(value.clone()),
                "image" => {
                    definition.image = Some(value.clone());
                    definition.image_dimensions = dims;
                }
                "thumb" => definition.thumbnails.push((value.clone(), dims)),
                _ => {}
            }
        }

        Ok(definition)
    }
}

/// Badge award (kind 8)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeAward {
    /// Badge definition address as written in the `a` tag (raw or naddr)
    pub badge_definition: String,
    /// Awarded pubkeys (hex) with optional relay hints
    pub awarded_pubkeys: Vec<(String, Option<String>)>,
}

impl BadgeAward {
    pub fn new(badge_definition: &Coordinate) -> Self {
        Self {
            badge_definition: badge_definition.to_string(),
            awarded_pubkeys: Vec::new(),
        }
    }

    pub fn add_recipient(mut self, pubkey: &PublicKey, relay: Option<String>) -> Self {
        self.awarded_pubkeys.push((pubkey.to_hex(), relay));
        self
    }

    /// Whether `pubkey` (hex) is among the recipients.
    pub fn is_awarded_to(&self, pubkey: &str) -> bool {
        self.awarded_pubkeys.iter().any(|(pk, _)| pk == pubkey)
    }

    /// Convert to event tags
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = vec![vec!["a".to_string(), self.badge_definition.clone()]];

        for (pubkey, relay) in &self.awarded_pubkeys {
            let mut tag = vec!["p".to_string(), pubkey.clone()];
            if let Some(r) = relay {
                tag.push(r.clone());
            }
            tags.push(tag);
        }

        tags
    }

    /// Parse from event tags
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, Nip58Error> {
        let mut badge_definition = None;
        let mut awarded_pubkeys = Vec::new();

        for tag in tags {
            match (tag.first().map(String::as_str), tag.get(1)) {
                (Some("a"), Some(address)) if badge_definition.is_none() => {
                    badge_definition = Some(address.clone());
                }
                (Some("p"), Some(pubkey)) => {
                    awarded_pubkeys.push((pubkey.clone(), tag.get(2).cloned()));
                }
                (Some("a" | "p"), None) => {
                    return Err(Nip58Error::InvalidTagFormat(format!(
                        "{} tag requires a value",
                        tag[0]
                    )));
                }
                _ => {}
            }
        }

        let badge_definition =
            badge_definition.ok_or_else(|| Nip58Error::MissingTag("a tag required".to_string()))?;

        if awarded_pubkeys.is_empty() {
            return Err(Nip58Error::MissingTag(
                "at least one p tag required".to_string(),
            ));
        }

        Ok(Self {
            badge_definition,
            awarded_pubkeys,
        })
    }
}

/// A displayable badge: an award joined to its definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub name: String,
    pub image: String,
    /// Raw `30009:pubkey:identifier` coordinate
    pub badge_address: String,
}

impl Badge {
    /// Join a definition to its coordinate. Both `name` and `image` are required.
    pub fn from_definition(
        address: &Coordinate,
        definition: &BadgeDefinition,
    ) -> Result<Self, Nip58Error> {
        let incomplete = |field| Nip58Error::Incomplete {
            address: address.to_string(),
            field,
        };

        let name = definition
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| incomplete("name"))?;
        let image = definition
            .image
            .clone()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| incomplete("image"))?;

        Ok(Self {
            name,
            image,
            badge_address: address.to_string(),
        })
    }
}
