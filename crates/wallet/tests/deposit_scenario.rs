//! Deposit and pay end to end against the in-memory mint.

use cashu_wallet::{
    CashuWallet, DepositStatus, MemoryConnector, UnitBalance, WalletError, WalletEvent,
    WalletState,
};
use nostr::Keys;
use nostr_client::{ClientConfig, SessionFactory};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const MINT: &str = "https://mint.example/Bitcoin";

fn factory() -> SessionFactory {
    nostr_client::init_test_tracing();
    SessionFactory::new(ClientConfig::default().with_relays(vec!["wss://relay.example".into()]))
}

#[tokio::test(start_paused = true)]
async fn test_deposit_ten_sats() -> anyhow::Result<()> {
    let connector = Arc::new(MemoryConnector::new());
    let wallet = CashuWallet::create_new_wallet(
        factory().demo(),
        connector.clone(),
        vec![MINT.to_string()],
        Vec::new(),
        Some("class wallet".into()),
    )
    .await?;
    assert_eq!(wallet.state().await, WalletState::Active);

    let deposit = wallet.initiate_deposit(10).await?;
    assert!(deposit.invoice.starts_with("lnbc"));
    assert_eq!(deposit.mint, MINT);
    // Nothing settles until the invoice is paid.
    assert!(wallet.balance().await.is_empty());

    connector.mint(MINT).await?.pay(&deposit.quote_id).await?;
    assert_eq!(deposit.wait().await, DepositStatus::Settled { amount: 10 });

    assert_eq!(wallet.balance().await, vec![UnitBalance::new("sat", 10)]);
    assert!(wallet.pending_deposit().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pay_classmate_then_resync() -> anyhow::Result<()> {
    let connector = Arc::new(MemoryConnector::new());
    let wallet = CashuWallet::create_new_wallet(
        factory().demo(),
        connector.clone(),
        vec![MINT.to_string()],
        Vec::new(),
        None,
    )
    .await?;

    let deposit = wallet.initiate_deposit(5).await?;
    connector.mint(MINT).await?.pay(&deposit.quote_id).await?;
    deposit.wait().await;

    let mut events = wallet.subscribe();
    let classmate = Keys::generate().public_key();
    // Five sats arrive as a 1 and a 4; the 1 covers the send exactly.
    let receipt = wallet.send_one_sat_to_npub(&classmate.to_npub()?).await?;
    assert_eq!(receipt.change, 0);
    assert_eq!(
        wallet.resync_balance().await,
        vec![UnitBalance::new("sat", 4)]
    );

    // Only the 4 is left, so the next send comes back with change.
    let receipt = wallet.send_one_sat_to_npub(&classmate.to_npub()?).await?;
    assert_eq!(receipt.change, 3);
    assert_eq!(
        wallet.resync_balance().await,
        vec![UnitBalance::new("sat", 3)]
    );
    let mut sent = 0;
    while let Ok(event) = events.try_recv() {
        if let WalletEvent::NutzapSent { recipient, amount, .. } = event {
            assert_eq!(recipient, classmate.to_hex());
            assert_eq!(amount, 1);
            sent += 1;
        }
    }
    assert_eq!(sent, 2);

    let err = wallet.send_nutzap(&classmate, 10, "").await.unwrap_err();
    assert!(err.recovery_hint().is_some());
    assert!(matches!(err, WalletError::InsufficientBalance { .. }));
    assert_eq!(wallet.balance().await, vec![UnitBalance::new("sat", 3)]);
    Ok(())
}

#[tokio::test]
async fn test_anonymous_session_cannot_create_wallet() {
    let result = CashuWallet::create_new_wallet(
        factory().anonymous(),
        Arc::new(MemoryConnector::new()),
        vec![MINT.to_string()],
        Vec::new(),
        None,
    )
    .await;
    assert!(matches!(result, Err(WalletError::WalletCreation(_))));
}
