//! Bounded subscriptions over real sockets

use crate::mock_relay::{Behavior, MockRelay};
use crate::test_factory;
use nostr::{Event, EventTemplate, Keys, finalize_event};
use nostr_client::{FetchOptions, Filter, StopReason};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn note(keys: &Keys, content: &str) -> Event {
    finalize_event(&EventTemplate::new(1, content), keys.secret_key()).unwrap()
}

fn options(idle_ms: u64, hard_ms: u64) -> FetchOptions {
    FetchOptions {
        idle_timeout: Duration::from_millis(idle_ms),
        hard_timeout: Duration::from_millis(hard_ms),
        ..FetchOptions::default()
    }
}

#[tokio::test]
async fn test_duplicate_delivery_is_deduplicated() {
    let keys = Keys::generate();
    let shared = note(&keys, "on both relays");
    let only_first = note(&keys, "first only");
    let only_second = note(&keys, "second only");

    let first = MockRelay::start().await;
    let second = MockRelay::start().await;
    first.store(shared.clone());
    first.store(only_first.clone());
    second.store(shared.clone());
    second.store(only_second.clone());

    let session = test_factory(&[&first.url, &second.url]).anonymous();
    session.connect().await.unwrap();

    let outcome = session
        .fetch(vec![Filter::new().kind(1).author(&keys.public_key())])
        .await
        .unwrap();

    let ids: HashSet<String> = outcome.events.iter().map(|e| e.id.clone()).collect();
    assert_eq!(outcome.events.len(), 3);
    assert_eq!(
        ids,
        HashSet::from([shared.id, only_first.id, only_second.id])
    );
    assert_eq!(outcome.stop, StopReason::Idle);
    assert_eq!(outcome.eose_relays, 2);
    assert_eq!(outcome.relay_count, 2);
}

#[tokio::test]
async fn test_straggler_inside_idle_window_is_kept() {
    let keys = Keys::generate();
    let relay = MockRelay::start().await;
    relay.store(note(&keys, "stored"));

    let session = test_factory(&[&relay.url]).anonymous();
    session.connect().await.unwrap();

    let straggler = note(&keys, "late");
    let pushed = straggler.clone();
    let pusher = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        relay.push(pushed);
    };

    let fetch = session.fetch_with(
        vec![Filter::new().kind(1).author(&keys.public_key())],
        options(400, 5_000),
    );
    let (outcome, ()) = tokio::join!(fetch, pusher);
    let outcome = outcome.unwrap();

    assert_eq!(outcome.stop, StopReason::Idle);
    assert_eq!(outcome.events.len(), 2);
    assert!(outcome.events.iter().any(|e| e.id == straggler.id));
}

#[tokio::test]
async fn test_hard_timeout_without_eose() {
    let keys = Keys::generate();
    let relay = MockRelay::start_with(Behavior {
        eose: false,
        ..Behavior::default()
    })
    .await;
    let session = test_factory(&[&relay.url]).anonymous();
    session.connect().await.unwrap();

    let flood_keys = keys.clone();
    let flood = async {
        for i in 0.. {
            tokio::time::sleep(Duration::from_millis(50)).await;
            relay.push(note(&flood_keys, &format!("tick {i}")));
        }
    };

    let started = Instant::now();
    let outcome = tokio::select! {
        outcome = session.fetch_with(
            vec![Filter::new().kind(1).author(&keys.public_key())],
            options(100, 800),
        ) => outcome.unwrap(),
        _ = flood => unreachable!("flood never ends"),
    };
    let elapsed = started.elapsed();

    assert_eq!(outcome.stop, StopReason::HardTimeout);
    assert!(elapsed >= Duration::from_millis(800), "stopped early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "stopped late: {elapsed:?}");
    assert!(!outcome.events.is_empty());
    assert_eq!(outcome.eose_relays, 0);
}

#[tokio::test]
async fn test_cancellation_stops_query() {
    let relay = MockRelay::start_with(Behavior {
        eose: false,
        ..Behavior::default()
    })
    .await;
    let session = test_factory(&[&relay.url]).anonymous();
    session.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = session
        .fetch_with(
            vec![Filter::new().kind(1)],
            options(100, 10_000).with_cancel(cancel),
        )
        .await
        .unwrap();
    assert_eq!(outcome.stop, StopReason::Cancelled);
}

#[tokio::test]
async fn test_close_sent_when_query_ends() {
    let relay = MockRelay::start().await;
    let session = test_factory(&[&relay.url]).anonymous();
    session.connect().await.unwrap();

    let outcome = session
        .fetch_with(vec![Filter::new().kind(1)], options(50, 2_000).close_on_eose())
        .await
        .unwrap();
    assert!(outcome.is_empty());
    assert_eq!(relay.req_count(), 1);

    // Give the CLOSE frames time to land.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(relay.close_count() >= 1);
    assert!(session.pool().subscription_ids().await.is_empty());
}

#[tokio::test]
async fn test_each_fetch_opens_a_fresh_subscription() {
    let relay = MockRelay::start().await;
    let session = test_factory(&[&relay.url]).anonymous();
    session.connect().await.unwrap();

    session.fetch(vec![Filter::new().kind(1)]).await.unwrap();
    session.fetch(vec![Filter::new().kind(1)]).await.unwrap();
    assert_eq!(relay.req_count(), 2);
}
