//! Badge issuing and resolution end to end

use crate::mock_relay::MockRelay;
use crate::test_factory;
use nostr::{BadgeDefinition, Keys};
use nostr_client::{
    Lookup, Profile, award_badge, create_badge_definition, fetch_profile, fetch_user_badges,
    publish_profile,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_two_awards_for_one_badge_resolve_once() {
    let relay = MockRelay::start().await;
    let factory = test_factory(&[&relay.url]);
    let issuer = factory.demo();
    let reader = factory.anonymous();
    issuer.connect().await.unwrap();
    reader.connect().await.unwrap();

    let student = Keys::generate().public_key();
    let definition = BadgeDefinition::new("loops")
        .with_name("Loop Master")
        .with_image("https://img.example/loops.png", None);
    let (address, published) = create_badge_definition(&issuer, &definition).await.unwrap();
    assert!(published.is_delivered());

    let classmate = Keys::generate().public_key();
    award_badge(&issuer, &address, &[student]).await.unwrap();
    award_badge(&issuer, &address, &[classmate, student]).await.unwrap();

    let badges = match fetch_user_badges(&reader, &student).await {
        Lookup::Found(badges) => badges,
        other => panic!("expected badges, got {other:?}"),
    };
    assert_eq!(badges.len(), 1);
    assert_eq!(badges[0].name, "Loop Master");
    assert_eq!(badges[0].image, "https://img.example/loops.png");
    assert_eq!(badges[0].badge_address, address.to_string());
}

#[tokio::test]
async fn test_incomplete_definitions_are_dropped() {
    let relay = MockRelay::start().await;
    let factory = test_factory(&[&relay.url]);
    let issuer = factory.demo();
    issuer.connect().await.unwrap();

    let student = Keys::generate().public_key();
    let (complete, _) = create_badge_definition(
        &issuer,
        &BadgeDefinition::new("a")
            .with_name("A")
            .with_image("https://img.example/a.png", None),
    )
    .await
    .unwrap();
    let (imageless, _) = create_badge_definition(&issuer, &BadgeDefinition::new("b").with_name("B"))
        .await
        .unwrap();
    award_badge(&issuer, &complete, &[student]).await.unwrap();
    award_badge(&issuer, &imageless, &[student]).await.unwrap();

    let badges = fetch_user_badges(&issuer, &student).await.unwrap_or_default();
    assert_eq!(badges.len(), 1);
    assert_eq!(badges[0].badge_address, complete.to_string());
}

#[tokio::test]
async fn test_no_awards_is_not_found() {
    let relay = MockRelay::start().await;
    let reader = test_factory(&[&relay.url]).anonymous();
    reader.connect().await.unwrap();

    let lookup = fetch_user_badges(&reader, &Keys::generate().public_key()).await;
    assert!(matches!(lookup, Lookup::NotFound));
}

#[tokio::test]
async fn test_profile_round_trip_through_relay() {
    let relay = MockRelay::start().await;
    let session = test_factory(&[&relay.url]).demo();
    session.connect().await.unwrap();

    let profile = Profile::default()
        .with_name("Grace")
        .with_picture("https://img.example/grace.png");
    publish_profile(&session, &profile).await.unwrap();

    let key = session.public_key().unwrap();
    assert_eq!(fetch_profile(&session, &key).await, Lookup::Found(profile));
    assert_eq!(
        fetch_profile(&session, &Keys::generate().public_key()).await,
        Lookup::NotFound
    );
}
