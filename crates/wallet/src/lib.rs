//! Cashu ecash wallet for the classroom app.
//!
//! The wallet lives on top of a [`nostr_client::NostrSession`]: creating it
//! publishes a wallet definition and nutzap info under the session's
//! identity, deposits are Lightning invoices settled in the background, and
//! payments to other users go out as nutzaps.
//!
//! # Example
//!
//! ```rust,no_run
//! use cashu_wallet::{CashuWallet, CdkConnector, WalletSettings, generate_seed};
//! use nostr_client::{ClientConfig, SessionFactory};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cashu_wallet::Result<()> {
//!     let session = SessionFactory::new(ClientConfig::load()?).demo();
//!     session.connect().await?;
//!
//!     let settings = WalletSettings::load()?;
//!     let connector = CdkConnector::from_settings(&settings, generate_seed())?;
//!     let wallet = CashuWallet::create_new_wallet(
//!         session,
//!         Arc::new(connector),
//!         vec!["https://mint.example/Bitcoin".to_string()],
//!         Vec::new(),
//!         Some("classroom".to_string()),
//!     )
//!     .await?;
//!
//!     let deposit = wallet.initiate_deposit(10).await?;
//!     println!("pay {}", deposit.invoice);
//!     deposit.wait().await;
//!     println!("balance {:?}", wallet.balance().await);
//!     Ok(())
//! }
//! ```

mod cdk_mint;
mod error;
mod events;
#[cfg(any(test, feature = "test-util"))]
mod memory_mint;
mod mint;
mod proofs;
mod settings;
mod wallet;

pub use cdk_mint::{CdkConnector, CdkMint, SEED_LEN, generate_seed};

pub use error::{Result, WalletError};
pub use events::{UnitBalance, WalletEvent};
#[cfg(any(test, feature = "test-util"))]
pub use memory_mint::{MemoryConnector, MemoryMint};
pub use mint::{
    MintClient, MintConnector, MintQuote, MintQuoteState, QUOTE_EXPIRY_SECS, SendSplit,
    split_amount,
};
pub use proofs::ProofStore;
pub use settings::WalletSettings;
pub use wallet::{
    CashuWallet, Deposit, DepositStatus, NutzapReceipt, WalletConfig, WalletState,
    newest_nutzap_info,
};
