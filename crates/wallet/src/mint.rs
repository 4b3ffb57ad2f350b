//! Cashu mint collaborator.
//!
//! The wallet talks to a mint only through [`MintClient`]: request a
//! Lightning quote (NUT-04), ask whether it was paid, mint proofs once it
//! was, and swap proofs into a locked send set plus change (NUT-03). A
//! [`MintConnector`] turns a mint URL into a client.
//!
//! [`CdkConnector`](crate::CdkConnector) reaches real mints over HTTP.

use crate::error::{Result, WalletError};
use async_trait::async_trait;
use cdk::Amount;
use nostr::Proof;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Lifetime of a fresh mint quote.
pub const QUOTE_EXPIRY_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintQuoteState {
    Unpaid,
    Paid,
    /// Proofs were already minted for this quote
    Issued,
    Expired,
}

/// A Lightning invoice the mint will honor with fresh proofs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
    pub id: String,
    /// BOLT11 invoice to pay
    pub request: String,
    pub amount: u64,
    pub unit: String,
    pub state: MintQuoteState,
    /// Unix seconds
    pub expiry: u64,
}

/// Result of a send swap: `send` is locked to the recipient, `keep` is change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendSplit {
    pub send: Vec<Proof>,
    pub keep: Vec<Proof>,
}

impl SendSplit {
    pub fn send_amount(&self) -> u64 {
        sum(&self.send)
    }

    pub fn keep_amount(&self) -> u64 {
        sum(&self.keep)
    }
}

#[async_trait]
pub trait MintClient: Send + Sync {
    fn url(&self) -> &str;

    async fn create_mint_quote(&self, amount: u64, unit: &str) -> Result<MintQuote>;

    async fn mint_quote_state(&self, quote_id: &str) -> Result<MintQuote>;

    /// Redeem a paid quote for proofs.
    async fn mint(&self, quote_id: &str) -> Result<Vec<Proof>>;

    /// Spend `proofs`, returning `amount` locked to `p2pk_lock` and the rest
    /// as change. Nothing is spent when this fails.
    async fn swap_send(
        &self,
        proofs: Vec<Proof>,
        amount: u64,
        p2pk_lock: &str,
    ) -> Result<SendSplit>;
}

#[async_trait]
pub trait MintConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn MintClient>>;
}

/// Decompose an amount into power-of-two denominations, smallest first.
pub fn split_amount(amount: u64) -> Vec<u64> {
    let mut parts: Vec<u64> = Amount::from(amount)
        .split()
        .into_iter()
        .map(u64::from)
        .collect();
    parts.sort_unstable();
    parts
}

pub(crate) fn sum(proofs: &[Proof]) -> u64 {
    proofs
        .iter()
        .fold(0u64, |acc, p| acc.saturating_add(p.amount))
}

pub(crate) fn validate_mint_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| WalletError::Mint(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WalletError::Mint(format!(
            "{url}: unsupported scheme {other}"
        ))),
    }
}
