//! Nostr relay client for the classroom app.
//!
//! This crate provides:
//! - WebSocket connections to Nostr relays with bounded retry
//! - A relay pool that publishes with per-relay acknowledgments
//! - Bounded subscriptions that settle on EOSE plus an idle window
//! - Local and delegated signers, and per-identity sessions
//! - Badge, profile and direct-message helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_client::{ClientConfig, Filter, SessionFactory};
//!
//! #[tokio::main]
//! async fn main() -> nostr_client::Result<()> {
//!     let factory = SessionFactory::new(ClientConfig::load()?);
//!     let session = factory.demo();
//!     session.connect().await?;
//!
//!     let outcome = session.publish(1, "hello class", Vec::new()).await?;
//!     println!("acknowledged by {:?}", outcome.acks);
//!
//!     let notes = session.fetch(vec![Filter::new().kind(1).limit(10)]).await?;
//!     for event in notes.sorted() {
//!         println!("{}: {}", event.pubkey, event.content);
//!     }
//!     Ok(())
//! }
//! ```

mod badges;
mod config;
mod dm;
mod error;
mod identity;
mod logging;
mod lookup;
mod message;
mod pool;
mod profile;
mod recovery;
mod relay;
mod session;
mod signer;
mod subscription;

pub use badges::{
    BadgeAddress, award_addresses, award_badge, create_badge_definition, fetch_user_badges,
    join_definitions,
};
pub use config::{APP_DIR, ClientConfig, RELAYS_ENV};
pub use dm::{read_direct_message, send_direct_message};
pub use error::{ClientError, Result};
pub use identity::{
    FileIdentityStore, IdentityStore, MemoryIdentityStore, StoredIdentity, authenticate,
};
pub use logging::{DEFAULT_FILTER, init_test_tracing, init_tracing, init_with_filter};
pub use lookup::Lookup;
pub use message::{ClientMessage, Filter, MessageError, RelayMessage};
pub use pool::{ConnectReport, PoolEvent, PublishOutcome, RelayAck, RelayPool};
pub use profile::{Profile, fetch_profile, newest_profile, publish_profile};
pub use recovery::ExponentialBackoff;
pub use relay::{ConnectionState, PublishConfirmation, RelayConfig, RelayConnection};
pub use session::{NostrSession, SessionFactory};
pub use signer::{
    DEFAULT_APPROVAL_TIMEOUT, DelegatedSigner, LocalSigner, Signer, SignerBackend, SigningAgent,
};
pub use subscription::{
    EventStream, FetchOptions, FetchOutcome, StopReason, SubscriptionState, SubscriptionTracker,
    generate_subscription_id,
};

/// Relays used when no configuration file says otherwise.
pub const DEFAULT_RELAYS: &[&str] = &["wss://relay.damus.io", "wss://nos.lol", "wss://relay.primal.net"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relays() {
        assert!(!DEFAULT_RELAYS.is_empty());
        for relay in DEFAULT_RELAYS {
            assert!(relay.starts_with("wss://"));
        }
    }
}
