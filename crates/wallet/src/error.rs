//! Wallet error types with recovery hints.

use nostr_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    /// Signer, relay list or mint list missing when creating the wallet.
    #[error("Wallet creation failed: {0}")]
    WalletCreation(String),

    /// Operation needs a created wallet.
    #[error("Wallet is not active")]
    NotActive,

    #[error("Insufficient balance: need {required} but only have {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The mint refused a request or could not be reached.
    #[error("Mint error: {0}")]
    Mint(String),

    #[error("No mint configured")]
    NoMint,

    /// No mint the recipient accepts holds enough of our funds.
    #[error("No mint shared with the recipient: {0}")]
    NoCommonMint(String),

    #[error("Invalid nutzap: {0}")]
    Nutzap(#[from] nostr::Nip61Error),

    /// The swap went through but the nutzap event could not be signed. The
    /// locked proofs are kept for [`CashuWallet::retry_held_nutzaps`].
    ///
    /// [`CashuWallet::retry_held_nutzaps`]: crate::CashuWallet::retry_held_nutzaps
    #[error("Nutzap of {amount} is held unpublished: {reason}")]
    NutzapHeld { amount: u64, reason: String },

    #[error("CDK error: {0}")]
    Cdk(#[from] cdk::error::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Deposit quote {0} not found")]
    QuoteNotFound(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WalletError>;

impl WalletError {
    /// A short suggestion the UI can show next to the error.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            Self::WalletCreation(_) => {
                Some("Sign in and configure at least one relay and one mint, then try again.")
            }
            Self::NotActive => Some("Create the wallet before depositing or sending."),
            Self::InsufficientBalance { .. } => {
                Some("Deposit more sats or send a smaller amount.")
            }
            Self::InvalidAmount(_) => Some("Amounts are whole, positive numbers of sats."),
            Self::Mint(_) => Some("The mint may be offline. Wait a moment and retry."),
            Self::NoMint => Some("Add a mint URL to the wallet settings."),
            Self::NoCommonMint(_) => {
                Some("Deposit into one of the mints the recipient lists, then retry.")
            }
            Self::NutzapHeld { .. } => {
                Some("Unlock your signing extension; the payment is sent on the next retry.")
            }
            Self::Cdk(_) => Some("The mint may be offline. Wait a moment and retry."),
            Self::QuoteNotFound(_) => Some("Start a new deposit."),
            Self::Client(ClientError::NoSigner | ClientError::SignerUnavailable(_)) => {
                Some("Sign in or unlock your signing extension.")
            }
            Self::Client(_)
            | Self::Nutzap(_)
            | Self::Config(_)
            | Self::Database(_)
            | Self::Io(_) => None,
        }
    }
}

impl From<nostr::Nip19Error> for WalletError {
    fn from(err: nostr::Nip19Error) -> Self {
        WalletError::Client(err.into())
    }
}
