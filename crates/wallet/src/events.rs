//! Notifications emitted by the wallet.

use serde::{Deserialize, Serialize};

/// Balance held in one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitBalance {
    pub unit: String,
    pub amount: u64,
}

impl UnitBalance {
    pub fn new(unit: impl Into<String>, amount: u64) -> Self {
        Self {
            unit: unit.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Wallet definition and nutzap info were published
    Created { mints: Vec<String> },
    /// Balance recomputed from the proof store
    BalanceUpdated(Vec<UnitBalance>),
    DepositSettled {
        quote_id: String,
        mint: String,
        amount: u64,
    },
    DepositExpired { quote_id: String },
    NutzapSent {
        event_id: String,
        recipient: String,
        mint: String,
        amount: u64,
    },
}
