//! Client error types

use thiserror::Error;

use crate::message::MessageError;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection error, including exhausted retries and zero reachable relays
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Malformed relay frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected to relay")]
    NotConnected,

    /// Event publish failed before reaching any relay
    #[error("Event publish failed: {0}")]
    PublishFailed(String),

    /// Invalid event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Key string in neither hex nor bech32 form
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Delegated signer has no agent attached, or the agent refused
    #[error("Signer unavailable: {0}")]
    SignerUnavailable(String),

    /// Operation needs a signer and the session has none
    #[error("No signer configured for this session")]
    NoSigner,

    /// Encryption or decryption failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Identity store failure
    #[error("Identity store error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<MessageError> for ClientError {
    fn from(err: MessageError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

impl From<nostr::Nip19Error> for ClientError {
    fn from(err: nostr::Nip19Error) -> Self {
        ClientError::InvalidKey(err.to_string())
    }
}

impl From<nostr::Nip01Error> for ClientError {
    fn from(err: nostr::Nip01Error) -> Self {
        ClientError::InvalidEvent(err.to_string())
    }
}

impl From<nostr::Nip04Error> for ClientError {
    fn from(err: nostr::Nip04Error) -> Self {
        ClientError::Encryption(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(err.to_string())
    }
}
