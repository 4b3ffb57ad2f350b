//! In-process mint for tests and demos.
//!
//! [`MemoryMint`] behaves the way a remote mint looks to the wallet: quotes
//! expire, proofs spend once, and locked sends carry a NUT-10 P2PK secret.
//! Invoices are settled by calling [`MemoryMint::pay`].

use crate::error::{Result, WalletError};
use crate::mint::{
    MintClient, MintConnector, MintQuote, MintQuoteState, QUOTE_EXPIRY_SECS, SendSplit,
    split_amount, sum, validate_mint_url,
};
use async_trait::async_trait;
use cdk::nuts::nut10::Secret as Nut10Secret;
use cdk::nuts::{PublicKey as CdkPublicKey, SpendingConditions};
use cdk::secret::Secret;
use nostr::{Proof, unix_now};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct MemoryMintState {
    quotes: HashMap<String, MintQuote>,
    /// Secrets of every proof this mint has signed
    issued: HashSet<String>,
    spent: HashSet<String>,
    offline: bool,
}

pub struct MemoryMint {
    url: String,
    keyset_id: String,
    state: Mutex<MemoryMintState>,
}

impl MemoryMint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keyset_id: format!("00{}", &uuid::Uuid::new_v4().simple().to_string()[..14]),
            state: Mutex::new(MemoryMintState::default()),
        }
    }

    /// Mark a quote's invoice as paid.
    pub async fn pay(&self, quote_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let quote = state
            .quotes
            .get_mut(quote_id)
            .ok_or_else(|| WalletError::QuoteNotFound(quote_id.to_string()))?;
        if quote.state == MintQuoteState::Unpaid {
            quote.state = MintQuoteState::Paid;
        }
        Ok(())
    }

    pub async fn expire(&self, quote_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let quote = state
            .quotes
            .get_mut(quote_id)
            .ok_or_else(|| WalletError::QuoteNotFound(quote_id.to_string()))?;
        if quote.state == MintQuoteState::Unpaid {
            quote.state = MintQuoteState::Expired;
        }
        Ok(())
    }

    /// While offline every request fails as unreachable.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    pub async fn is_spent(&self, secret: &str) -> bool {
        self.state.lock().await.spent.contains(secret)
    }

    fn reachable(&self, state: &MemoryMintState) -> Result<()> {
        if state.offline {
            return Err(WalletError::Mint(format!("{} is unreachable", self.url)));
        }
        Ok(())
    }

    fn sign(&self, state: &mut MemoryMintState, amount: u64, secret: String) -> Proof {
        state.issued.insert(secret.clone());
        Proof {
            amount,
            c: format!("02{}", uuid::Uuid::new_v4().simple()),
            id: self.keyset_id.clone(),
            secret,
        }
    }

    fn issue(&self, state: &mut MemoryMintState, amount: u64) -> Vec<Proof> {
        split_amount(amount)
            .into_iter()
            .map(|denomination| {
                let secret = Secret::generate().to_string();
                self.sign(state, denomination, secret)
            })
            .collect()
    }

    fn issue_locked(
        &self,
        state: &mut MemoryMintState,
        amount: u64,
        lock: &CdkPublicKey,
    ) -> Result<Vec<Proof>> {
        split_amount(amount)
            .into_iter()
            .map(|denomination| {
                let conditions = SpendingConditions::new_p2pk(lock.clone(), None);
                let secret = Secret::try_from(Nut10Secret::from(conditions))
                    .map_err(|e| WalletError::Mint(format!("P2PK secret: {e}")))?;
                Ok(self.sign(state, denomination, secret.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl MintClient for MemoryMint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn create_mint_quote(&self, amount: u64, unit: &str) -> Result<MintQuote> {
        let mut state = self.state.lock().await;
        self.reachable(&state)?;
        if amount == 0 {
            return Err(WalletError::InvalidAmount("quote amount must be positive".into()));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let quote = MintQuote {
            request: format!("lnbc{}n1p{}", amount.saturating_mul(10), id),
            id: id.clone(),
            amount,
            unit: unit.to_string(),
            state: MintQuoteState::Unpaid,
            expiry: unix_now() + QUOTE_EXPIRY_SECS,
        };
        state.quotes.insert(id, quote.clone());
        Ok(quote)
    }

    async fn mint_quote_state(&self, quote_id: &str) -> Result<MintQuote> {
        let state = self.state.lock().await;
        self.reachable(&state)?;
        state
            .quotes
            .get(quote_id)
            .cloned()
            .ok_or_else(|| WalletError::QuoteNotFound(quote_id.to_string()))
    }

    async fn mint(&self, quote_id: &str) -> Result<Vec<Proof>> {
        let mut state = self.state.lock().await;
        self.reachable(&state)?;
        let quote = state
            .quotes
            .get(quote_id)
            .cloned()
            .ok_or_else(|| WalletError::QuoteNotFound(quote_id.to_string()))?;
        if quote.state != MintQuoteState::Paid {
            return Err(WalletError::Mint(format!(
                "quote {} is {:?}, not paid",
                quote_id, quote.state
            )));
        }

        let proofs = self.issue(&mut state, quote.amount);
        if let Some(stored) = state.quotes.get_mut(quote_id) {
            stored.state = MintQuoteState::Issued;
        }
        debug!("Minted {} {} for quote {}", quote.amount, quote.unit, quote_id);
        Ok(proofs)
    }

    async fn swap_send(
        &self,
        proofs: Vec<Proof>,
        amount: u64,
        p2pk_lock: &str,
    ) -> Result<SendSplit> {
        let mut state = self.state.lock().await;
        self.reachable(&state)?;
        if amount == 0 {
            return Err(WalletError::InvalidAmount("send amount must be positive".into()));
        }
        let lock = CdkPublicKey::from_hex(p2pk_lock)
            .map_err(|e| WalletError::Mint(format!("invalid P2PK lock {p2pk_lock}: {e}")))?;

        let mut seen = HashSet::new();
        for proof in &proofs {
            if !state.issued.contains(&proof.secret) {
                return Err(WalletError::Mint("proof was not issued by this mint".into()));
            }
            if state.spent.contains(&proof.secret) || !seen.insert(proof.secret.as_str()) {
                return Err(WalletError::Mint("proof already spent".into()));
            }
        }

        let total = sum(&proofs);
        if total < amount {
            return Err(WalletError::InsufficientBalance {
                required: amount,
                available: total,
            });
        }

        let send = self.issue_locked(&mut state, amount, &lock)?;
        for proof in &proofs {
            state.spent.insert(proof.secret.clone());
        }
        let keep = self.issue(&mut state, total - amount);
        Ok(SendSplit { send, keep })
    }
}

/// Hands out one shared [`MemoryMint`] per URL.
#[derive(Default)]
pub struct MemoryConnector {
    mints: Mutex<HashMap<String, Arc<MemoryMint>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mint behind `url`, created on first use.
    pub async fn mint(&self, url: &str) -> Result<Arc<MemoryMint>> {
        validate_mint_url(url)?;
        let mut mints = self.mints.lock().await;
        Ok(mints
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(MemoryMint::new(url)))
            .clone())
    }
}

#[async_trait]
impl MintConnector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn MintClient>> {
        let mint: Arc<dyn MintClient> = self.mint(url).await?;
        Ok(mint)
    }
}
