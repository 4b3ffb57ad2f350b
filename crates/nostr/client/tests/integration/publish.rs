//! Publishing and acknowledgment sets

use crate::mock_relay::{AckMode, Behavior, MockRelay};
use crate::{test_config, test_factory};
use nostr_client::{ClientError, RelayPool};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

#[tokio::test]
async fn test_publish_collects_acks_from_every_relay() {
    let first = MockRelay::start().await;
    let second = MockRelay::start().await;
    let session = test_factory(&[&first.url, &second.url]).demo();
    session.connect().await.unwrap();

    let outcome = session.publish(1, "hello class", Vec::new()).await.unwrap();

    assert!(outcome.is_delivered());
    assert_eq!(
        outcome.acks,
        BTreeSet::from([first.url.clone(), second.url.clone()])
    );
    assert!(outcome.rejected.is_empty());
    assert_eq!(first.stored(), vec![outcome.event.clone()]);
    assert_eq!(second.stored(), vec![outcome.event]);
}

#[tokio::test]
async fn test_zero_acks_is_soft_failure() {
    let rejecting = MockRelay::start_with(Behavior {
        ack: AckMode::Reject,
        ..Behavior::default()
    })
    .await;
    let silent = MockRelay::start_with(Behavior {
        ack: AckMode::Ignore,
        ..Behavior::default()
    })
    .await;
    let session = test_factory(&[&rejecting.url, &silent.url]).demo();
    session.connect().await.unwrap();

    let outcome = session.publish(1, "anyone?", Vec::new()).await.unwrap();

    assert!(!outcome.is_delivered());
    assert!(outcome.acks.is_empty());
    assert_eq!(outcome.rejected.len(), 2);
    assert!(outcome.rejected[&rejecting.url].contains("blocked"));
}

#[tokio::test]
async fn test_partial_acks() {
    let accepting = MockRelay::start().await;
    let rejecting = MockRelay::start_with(Behavior {
        ack: AckMode::Reject,
        ..Behavior::default()
    })
    .await;
    let session = test_factory(&[&accepting.url, &rejecting.url]).demo();
    session.connect().await.unwrap();

    let outcome = session.publish(1, "half", Vec::new()).await.unwrap();
    assert_eq!(outcome.acks, BTreeSet::from([accepting.url.clone()]));
    assert!(outcome.rejected.contains_key(&rejecting.url));
}

#[tokio::test]
async fn test_partial_connectivity_is_accepted() {
    let relay = MockRelay::start().await;
    let dead = MockRelay::unreachable_url().await;
    let config = test_config(&[&relay.url, &dead]);
    let pool = RelayPool::with_config(config.relay_config());

    let report = pool.connect(&config.relays).await.unwrap();

    assert_eq!(report.connected, vec![relay.url.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, dead);
    assert_eq!(pool.connected_relays().await, vec![relay.url.clone()]);
}

#[tokio::test]
async fn test_all_relays_unreachable() {
    let dead = MockRelay::unreachable_url().await;
    let session = test_factory(&[&dead]).demo();
    assert!(matches!(
        session.connect().await,
        Err(ClientError::Connection(_))
    ));
}
