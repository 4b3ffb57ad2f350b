//! Direct messages through a relay

use crate::mock_relay::{AckMode, Behavior, MockRelay};
use crate::test_factory;
use nostr::{ENCRYPTED_DM_KIND, Keys};
use nostr_client::{Filter, read_direct_message, send_direct_message};

#[tokio::test]
async fn test_recipient_reads_message() -> anyhow::Result<()> {
    let relay = MockRelay::start().await;
    let factory = test_factory(&[&relay.url]);
    let bob_keys = Keys::generate();
    let alice = factory.demo();
    let bob = factory.with_keys(bob_keys.clone());
    alice.connect().await?;
    bob.connect().await?;

    let delivered =
        send_direct_message(&alice, &bob_keys.public_key(), "homework is due friday").await?;
    assert!(delivered);

    let inbox = bob
        .fetch(vec![
            Filter::new()
                .kind(ENCRYPTED_DM_KIND)
                .pubkey_refs(vec![bob_keys.public_key().to_hex()]),
        ])
        .await?;
    assert_eq!(inbox.events.len(), 1);
    assert_ne!(inbox.events[0].content, "homework is due friday");
    assert_eq!(
        read_direct_message(&bob, &inbox.events[0]).await?,
        "homework is due friday"
    );

    // The sender can read their own copy too.
    assert_eq!(
        read_direct_message(&alice, &inbox.events[0]).await?,
        "homework is due friday"
    );
    Ok(())
}

#[tokio::test]
async fn test_rejected_message_returns_false() {
    let relay = MockRelay::start_with(Behavior {
        ack: AckMode::Reject,
        ..Behavior::default()
    })
    .await;
    let alice = test_factory(&[&relay.url]).demo();
    alice.connect().await.unwrap();

    let delivered = send_direct_message(&alice, &Keys::generate().public_key(), "hello?")
        .await
        .unwrap();
    assert!(!delivered);
    assert!(relay.stored().is_empty());
}
