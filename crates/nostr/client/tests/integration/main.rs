//! Integration tests against an in-process mock relay.

mod badges;
mod dm;
mod mock_relay;
mod publish;
mod subscribe;

use nostr_client::{ClientConfig, ExponentialBackoff, SessionFactory};
use std::time::Duration;

/// Config pointed at `relays` with timings short enough for tests.
pub fn test_config(relays: &[&str]) -> ClientConfig {
    nostr_client::init_test_tracing();
    ClientConfig {
        connect_timeout: Duration::from_secs(2),
        idle_timeout: Duration::from_millis(300),
        hard_timeout: Duration::from_secs(3),
        ack_timeout: Duration::from_millis(500),
        retry: ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(50), 2),
        ..ClientConfig::default()
    }
    .with_relays(relays.iter().map(|s| s.to_string()).collect())
}

pub fn test_factory(relays: &[&str]) -> SessionFactory {
    SessionFactory::new(test_config(relays))
}
