//! Nostr relay message types.
//!
//! Relay protocol frames from NIP-01:
//! - Client to Relay: EVENT, REQ, CLOSE, AUTH
//! - Relay to Client: EVENT, OK, EOSE, CLOSED, NOTICE, AUTH

use nostr::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur when parsing relay messages.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),
}

/// Messages sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// `["EVENT", <event JSON>]`
    Event(Event),

    /// `["REQ", <subscription_id>, <filter1>, <filter2>, ...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },

    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: String },

    /// `["AUTH", <event JSON>]`
    Auth(Event),
}

impl ClientMessage {
    /// Serialize to the JSON array sent over the socket.
    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => serde_json::json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut frame = vec![Value::from("REQ"), Value::from(subscription_id.as_str())];
                for filter in filters {
                    frame.push(serde_json::to_value(filter)?);
                }
                Value::Array(frame)
            }
            ClientMessage::Close { subscription_id } => serde_json::json!(["CLOSE", subscription_id]),
            ClientMessage::Auth(event) => serde_json::json!(["AUTH", event]),
        };
        Ok(value.to_string())
    }

    /// Parse a client frame. Used by relays and test doubles.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let frame = Frame::parse(json)?;
        match frame.kind()? {
            "EVENT" => Ok(ClientMessage::Event(frame.event_at(1)?)),
            "REQ" => {
                let subscription_id = frame.str_at(1, "subscription_id")?;
                let filters = frame.values[2..]
                    .iter()
                    .map(|v| serde_json::from_value(v.clone()))
                    .collect::<Result<Vec<Filter>, _>>()?;
                Ok(ClientMessage::Req {
                    subscription_id,
                    filters,
                })
            }
            "CLOSE" => Ok(ClientMessage::Close {
                subscription_id: frame.str_at(1, "subscription_id")?,
            }),
            "AUTH" => Ok(ClientMessage::Auth(frame.event_at(1)?)),
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event JSON>]`
    Event {
        subscription_id: String,
        event: Event,
    },

    /// `["OK", <event_id>, <true|false>, <message>]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },

    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },

    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        subscription_id: String,
        message: String,
    },

    /// `["NOTICE", <message>]`
    Notice { message: String },

    /// `["AUTH", <challenge>]`
    Auth { challenge: String },
}

impl RelayMessage {
    /// Parse a JSON frame received from the relay.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let frame = Frame::parse(json)?;
        match frame.kind()? {
            "EVENT" => Ok(RelayMessage::Event {
                subscription_id: frame.str_at(1, "subscription_id")?,
                event: frame.event_at(2)?,
            }),
            "OK" => {
                let accepted = frame
                    .values
                    .get(2)
                    .ok_or_else(|| MessageError::MissingField("accepted".to_string()))?
                    .as_bool()
                    .ok_or_else(|| MessageError::InvalidFormat("accepted not a boolean".to_string()))?;
                Ok(RelayMessage::Ok {
                    event_id: frame.str_at(1, "event_id")?,
                    accepted,
                    message: frame.optional_str_at(3),
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: frame.str_at(1, "subscription_id")?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: frame.str_at(1, "subscription_id")?,
                message: frame.optional_str_at(2),
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: frame.str_at(1, "message")?,
            }),
            "AUTH" => Ok(RelayMessage::Auth {
                challenge: frame.str_at(1, "challenge")?,
            }),
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }

    /// Serialize to the JSON array a relay would send.
    pub fn to_json(&self) -> String {
        let value = match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => serde_json::json!(["EVENT", subscription_id, event]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => serde_json::json!(["OK", event_id, accepted, message]),
            RelayMessage::Eose { subscription_id } => serde_json::json!(["EOSE", subscription_id]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => serde_json::json!(["CLOSED", subscription_id, message]),
            RelayMessage::Notice { message } => serde_json::json!(["NOTICE", message]),
            RelayMessage::Auth { challenge } => serde_json::json!(["AUTH", challenge]),
        };
        value.to_string()
    }
}

/// A decoded wire frame: a JSON array whose first element names the message.
struct Frame {
    values: Vec<Value>,
}

impl Frame {
    fn parse(json: &str) -> Result<Self, MessageError> {
        let values: Vec<Value> =
            serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;
        if values.is_empty() {
            return Err(MessageError::InvalidFormat("empty array".to_string()));
        }
        Ok(Self { values })
    }

    fn kind(&self) -> Result<&str, MessageError> {
        self.values[0]
            .as_str()
            .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))
    }

    fn str_at(&self, index: usize, field: &str) -> Result<String, MessageError> {
        self.values
            .get(index)
            .ok_or_else(|| MessageError::MissingField(field.to_string()))?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MessageError::InvalidFormat(format!("{} not a string", field)))
    }

    fn optional_str_at(&self, index: usize) -> String {
        self.values
            .get(index)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn event_at(&self, index: usize) -> Result<Event, MessageError> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| MessageError::MissingField("event".to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Filter for subscription requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Author pubkeys (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Generic tag queries keyed by `#<letter>`
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn author(self, pubkey: &nostr::PublicKey) -> Self {
        self.authors(vec![pubkey.to_hex()])
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn kind(self, kind: u16) -> Self {
        self.kinds(vec![kind])
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a tag filter. `key` is the tag letter without `#`.
    pub fn tag(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", key.into()), values);
        self
    }

    /// Filter by `#p` (pubkey reference) tags.
    pub fn pubkey_refs(self, pubkeys: Vec<String>) -> Self {
        self.tag("p", pubkeys)
    }

    /// Filter by `#d` identifiers of addressable events.
    pub fn identifiers(self, identifiers: Vec<String>) -> Self {
        self.tag("d", identifiers)
    }

    /// Whether `event` satisfies every condition of this filter.
    ///
    /// `limit` is ignored; it bounds stored results, not matching.
    pub fn matches(&self, event: &Event) -> bool {
        fn contains(list: &Option<Vec<String>>, value: &str) -> bool {
            list.as_ref().is_none_or(|l| l.iter().any(|v| v == value))
        }

        if !contains(&self.ids, &event.id) || !contains(&self.authors, &event.pubkey) {
            return false;
        }
        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&event.kind)
        {
            return false;
        }
        if self.since.is_some_and(|since| event.created_at < since)
            || self.until.is_some_and(|until| event.created_at > until)
        {
            return false;
        }

        self.tags.iter().all(|(key, values)| {
            let name = key.trim_start_matches('#');
            event.tag_values(name).any(|v| values.iter().any(|w| w == v))
        })
    }
}
