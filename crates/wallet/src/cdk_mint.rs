//! Mint client backed by the Cashu Development Kit.
//!
//! Each mint URL gets one [`cdk::wallet::Wallet`] sharing a redb database
//! and a seed. cdk keeps its own proof table as a cache; the wallet's
//! [`ProofStore`](crate::ProofStore) stays the record of what can be spent,
//! so proofs cross this boundary in their NIP-60 form.

use crate::error::{Result, WalletError};
use crate::mint::{
    MintClient, MintConnector, MintQuote, MintQuoteState, SendSplit, validate_mint_url,
};
use crate::settings::WalletSettings;
use async_trait::async_trait;
use cdk::Amount;
use cdk::amount::SplitTarget;
use cdk::nuts::{
    CurrencyUnit, Id, MintQuoteState as CdkQuoteState, Proof as CdkProof, PublicKey,
    SpendingConditions,
};
use cdk::secret::Secret;
use cdk::wallet::Wallet;
use cdk_redb::WalletRedbDatabase;
use nostr::{Proof, unix_now};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Seed length cdk derives blinding secrets from.
pub const SEED_LEN: usize = 64;

/// A fresh random wallet seed. Persist it: proofs minted under one seed
/// can only be restored with the same seed.
pub fn generate_seed() -> [u8; SEED_LEN] {
    rand::random()
}

pub(crate) fn to_cdk_proof(proof: &Proof) -> Result<CdkProof> {
    Ok(CdkProof {
        amount: Amount::from(proof.amount),
        keyset_id: Id::from_str(&proof.id)
            .map_err(|e| WalletError::Mint(format!("invalid keyset id '{}': {}", proof.id, e)))?,
        secret: Secret::from_str(&proof.secret)
            .map_err(|e| WalletError::Mint(format!("invalid secret: {}", e)))?,
        c: PublicKey::from_hex(&proof.c)
            .map_err(|e| WalletError::Mint(format!("invalid C value: {}", e)))?,
        witness: None,
        dleq: None,
    })
}

pub(crate) fn from_cdk_proof(proof: &CdkProof) -> Proof {
    Proof {
        amount: u64::from(proof.amount),
        c: proof.c.to_hex(),
        id: proof.keyset_id.to_string(),
        secret: proof.secret.to_string(),
    }
}

/// Fold cdk's quote state into ours. cdk has no expired state; an unpaid
/// quote past its expiry is treated as expired.
fn quote_state(state: CdkQuoteState, expiry: u64, now: u64) -> MintQuoteState {
    match state {
        CdkQuoteState::Unpaid | CdkQuoteState::Pending if expiry > 0 && now > expiry => {
            MintQuoteState::Expired
        }
        CdkQuoteState::Unpaid | CdkQuoteState::Pending => MintQuoteState::Unpaid,
        CdkQuoteState::Paid => MintQuoteState::Paid,
        CdkQuoteState::Issued => MintQuoteState::Issued,
    }
}

/// One remote mint.
pub struct CdkMint {
    url: String,
    unit: String,
    inner: Wallet,
    /// Quotes created through this client, by id
    quotes: Mutex<HashMap<String, MintQuote>>,
    /// Minting and swapping read cdk's proof table back; one at a time
    op_lock: Mutex<()>,
}

impl CdkMint {
    async fn unspent_secrets(&self) -> Result<HashSet<String>> {
        Ok(self
            .inner
            .get_unspent_proofs()
            .await?
            .iter()
            .map(|p| p.secret.to_string())
            .collect())
    }

    /// Unspent proofs cdk gained since `before` was taken.
    async fn new_unspent(&self, before: &HashSet<String>) -> Result<Vec<CdkProof>> {
        Ok(self
            .inner
            .get_unspent_proofs()
            .await?
            .into_iter()
            .filter(|p| !before.contains(&p.secret.to_string()))
            .collect())
    }

    /// Underlying cdk wallet, for operations this client does not wrap.
    pub fn inner(&self) -> &Wallet {
        &self.inner
    }
}

#[async_trait]
impl MintClient for CdkMint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn create_mint_quote(&self, amount: u64, unit: &str) -> Result<MintQuote> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount("quote amount must be positive".into()));
        }
        if unit != self.unit {
            return Err(WalletError::Mint(format!(
                "{} is set up for {}, not {}",
                self.url, self.unit, unit
            )));
        }

        let quote = self.inner.mint_quote(Amount::from(amount), None).await?;
        let quote = MintQuote {
            id: quote.id,
            request: quote.request,
            amount,
            unit: self.unit.clone(),
            state: MintQuoteState::Unpaid,
            expiry: quote.expiry,
        };
        debug!("Mint quote {} created at {}", quote.id, self.url);
        self.quotes
            .lock()
            .await
            .insert(quote.id.clone(), quote.clone());
        Ok(quote)
    }

    async fn mint_quote_state(&self, quote_id: &str) -> Result<MintQuote> {
        let response = self.inner.mint_quote_state(quote_id).await?;
        let mut quotes = self.quotes.lock().await;
        let quote = quotes
            .get_mut(quote_id)
            .ok_or_else(|| WalletError::QuoteNotFound(quote_id.to_string()))?;
        quote.state = quote_state(response.state, quote.expiry, unix_now());
        Ok(quote.clone())
    }

    async fn mint(&self, quote_id: &str) -> Result<Vec<Proof>> {
        let _op = self.op_lock.lock().await;
        let before = self.unspent_secrets().await?;
        self.inner
            .mint(quote_id, SplitTarget::default(), None)
            .await?;
        let minted = self.new_unspent(&before).await?;

        if let Some(quote) = self.quotes.lock().await.get_mut(quote_id) {
            quote.state = MintQuoteState::Issued;
        }
        info!("Minted {} proofs at {} for quote {}", minted.len(), self.url, quote_id);
        Ok(minted.iter().map(from_cdk_proof).collect())
    }

    async fn swap_send(
        &self,
        proofs: Vec<Proof>,
        amount: u64,
        p2pk_lock: &str,
    ) -> Result<SendSplit> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount("send amount must be positive".into()));
        }
        let lock = PublicKey::from_hex(p2pk_lock)
            .map_err(|e| WalletError::Mint(format!("invalid P2PK lock {p2pk_lock}: {e}")))?;
        let inputs = proofs
            .iter()
            .map(to_cdk_proof)
            .collect::<Result<Vec<_>>>()?;

        let _op = self.op_lock.lock().await;
        let before = self.unspent_secrets().await?;
        let send = self
            .inner
            .swap(
                Some(Amount::from(amount)),
                SplitTarget::default(),
                inputs,
                Some(SpendingConditions::new_p2pk(lock, None)),
                false,
            )
            .await?
            .ok_or_else(|| WalletError::Mint(format!("{} returned no send proofs", self.url)))?;

        let sent: HashSet<String> = send.iter().map(|p| p.secret.to_string()).collect();
        let keep = self
            .new_unspent(&before)
            .await?
            .into_iter()
            .filter(|p| !sent.contains(&p.secret.to_string()))
            .map(|p| from_cdk_proof(&p))
            .collect();

        Ok(SendSplit {
            send: send.iter().map(from_cdk_proof).collect(),
            keep,
        })
    }
}

/// Opens one [`CdkMint`] per URL over a shared database.
pub struct CdkConnector {
    database: Arc<WalletRedbDatabase>,
    seed: [u8; SEED_LEN],
    unit: String,
    mints: Mutex<HashMap<String, Arc<CdkMint>>>,
}

impl CdkConnector {
    pub fn new(
        database: Arc<WalletRedbDatabase>,
        seed: [u8; SEED_LEN],
        unit: impl Into<String>,
    ) -> Self {
        Self {
            database,
            seed,
            unit: unit.into(),
            mints: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or create) the redb database at `path`.
    pub fn open(path: &Path, seed: [u8; SEED_LEN], unit: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let database =
            WalletRedbDatabase::new(path).map_err(|e| WalletError::Database(e.to_string()))?;
        Ok(Self::new(Arc::new(database), seed, unit))
    }

    /// Open the database the settings point at, in the settings' unit.
    pub fn from_settings(settings: &WalletSettings, seed: [u8; SEED_LEN]) -> Result<Self> {
        Self::open(&settings.database_path()?, seed, settings.unit.clone())
    }

    pub async fn client(&self, url: &str) -> Result<Arc<CdkMint>> {
        validate_mint_url(url)?;
        let mut mints = self.mints.lock().await;
        if let Some(mint) = mints.get(url) {
            return Ok(mint.clone());
        }

        let unit = CurrencyUnit::from_str(&self.unit)
            .map_err(|e| WalletError::Config(format!("unit {}: {}", self.unit, e)))?;
        let inner = Wallet::new(url, unit, self.database.clone(), &self.seed, None)?;
        let mint = Arc::new(CdkMint {
            url: url.to_string(),
            unit: self.unit.clone(),
            inner,
            quotes: Mutex::new(HashMap::new()),
            op_lock: Mutex::new(()),
        });
        mints.insert(url.to_string(), mint.clone());
        Ok(mint)
    }
}

#[async_trait]
impl MintConnector for CdkConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn MintClient>> {
        let mint: Arc<dyn MintClient> = self.client(url).await?;
        Ok(mint)
    }
}
