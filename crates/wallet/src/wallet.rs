//! The wallet state machine.
//!
//! A [`CashuWallet`] is bound to one [`NostrSession`]. Creating it publishes
//! the wallet definition (kind 17375) and the nutzap info (kind 10019) that
//! lets other users pay it. Balances are always derived from the proof store,
//! which only changes after the mint has confirmed an operation.

use crate::error::{Result, WalletError};
use crate::events::{UnitBalance, WalletEvent};
use crate::mint::{MintClient, MintConnector, MintQuoteState, SendSplit};
use crate::proofs::ProofStore;
use crate::settings::WalletSettings;
use nostr::{
    Event, EventTemplate, MintInfo, NUTZAP_INFO_KIND, NUTZAP_KIND, Nutzap, NutzapInfo, PublicKey,
    SecretKey, WALLET_KIND, WalletDefinition,
};
use nostr_client::{Filter, NostrSession, PublishOutcome};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletState {
    Uninitialized,
    /// Definition published, mints not yet attached
    Created,
    /// Balance is tracked and payments can be made
    Active,
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub name: Option<String>,
    pub mints: Vec<String>,
    pub relays: Vec<String>,
    /// Key nutzaps to this wallet are locked to
    pub p2pk: Option<SecretKey>,
    pub unit: String,
}

/// How a deposit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositStatus {
    Settled { amount: u64 },
    Expired,
    /// Replaced by a newer deposit or cancelled by the caller
    Cancelled,
    Failed(String),
}

/// A Lightning invoice waiting to be paid.
///
/// Returned as soon as the mint hands out the invoice. Settlement happens in
/// the background, possibly much later; [`Deposit::wait`] resolves when it
/// does.
#[derive(Debug, Clone)]
pub struct Deposit {
    pub invoice: String,
    pub quote_id: String,
    pub mint: String,
    pub amount: u64,
    done: watch::Receiver<Option<DepositStatus>>,
}

impl Deposit {
    pub fn status(&self) -> Option<DepositStatus> {
        self.done.borrow().clone()
    }

    pub async fn wait(&self) -> DepositStatus {
        let mut done = self.done.clone();
        loop {
            let current = done.borrow_and_update().clone();
            if let Some(status) = current {
                return status;
            }
            if done.changed().await.is_err() {
                return done.borrow().clone().unwrap_or(DepositStatus::Cancelled);
            }
        }
    }
}

/// A published nutzap.
#[derive(Debug, Clone)]
pub struct NutzapReceipt {
    pub mint: String,
    pub amount: u64,
    /// Change returned to the wallet by the swap
    pub change: u64,
    pub outcome: PublishOutcome,
}

impl NutzapReceipt {
    pub fn event(&self) -> &Event {
        &self.outcome.event
    }

    pub fn is_delivered(&self) -> bool {
        self.outcome.is_delivered()
    }
}

struct PendingDeposit {
    deposit: Deposit,
    cancel: CancellationToken,
}

struct WalletInner {
    session: NostrSession,
    connector: Arc<dyn MintConnector>,
    settings: WalletSettings,
    state: RwLock<WalletState>,
    config: RwLock<Option<WalletConfig>>,
    /// Attached mints in configuration order
    mints: RwLock<Vec<Arc<dyn MintClient>>>,
    proofs: Mutex<ProofStore>,
    pending: Mutex<Option<PendingDeposit>>,
    events: broadcast::Sender<WalletEvent>,
    /// Serializes sends so two payments never select the same proofs
    send_lock: Mutex<()>,
    create_lock: Mutex<()>,
    /// Swapped nutzaps whose event was never signed
    held: Mutex<Vec<Nutzap>>,
    shutdown: CancellationToken,
}

/// Cashu wallet bound to a Nostr identity.
#[derive(Clone)]
pub struct CashuWallet {
    inner: Arc<WalletInner>,
}

impl CashuWallet {
    pub fn new(
        session: NostrSession,
        connector: Arc<dyn MintConnector>,
        settings: WalletSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(WalletInner {
                session,
                connector,
                settings,
                state: RwLock::new(WalletState::Uninitialized),
                config: RwLock::new(None),
                mints: RwLock::new(Vec::new()),
                proofs: Mutex::new(ProofStore::new()),
                pending: Mutex::new(None),
                events,
                send_lock: Mutex::new(()),
                create_lock: Mutex::new(()),
                held: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Build a wallet with default settings and create it in one step.
    pub async fn create_new_wallet(
        session: NostrSession,
        connector: Arc<dyn MintConnector>,
        mints: Vec<String>,
        relays: Vec<String>,
        name: Option<String>,
    ) -> Result<Self> {
        let wallet = Self::new(session, connector, WalletSettings::default());
        wallet.create(mints, relays, name).await?;
        Ok(wallet)
    }

    /// Publish the wallet and attach its mints.
    ///
    /// Empty `mints` or `relays` fall back to the settings' default mints and
    /// the session's relays. A failed attempt leaves the wallet
    /// `Uninitialized`, so `create` can simply be called again.
    pub async fn create(
        &self,
        mints: Vec<String>,
        relays: Vec<String>,
        name: Option<String>,
    ) -> Result<()> {
        let _creating = self.inner.create_lock.lock().await;
        if *self.inner.state.read().await != WalletState::Uninitialized {
            return Err(WalletError::WalletCreation("wallet already created".into()));
        }

        let result = self.publish_wallet(mints, relays, name).await;
        if let Err(ref e) = result {
            warn!("Wallet creation failed: {}", e);
            *self.inner.state.write().await = WalletState::Uninitialized;
        }
        result
    }

    async fn publish_wallet(
        &self,
        mints: Vec<String>,
        relays: Vec<String>,
        name: Option<String>,
    ) -> Result<()> {
        let inner = &self.inner;
        let signer = inner
            .session
            .signer()
            .map_err(|_| WalletError::WalletCreation("no signer available".into()))?;
        let owner = signer.public_key();

        let relays = if relays.is_empty() {
            inner.session.config().relays.clone()
        } else {
            relays
        };
        if relays.is_empty() {
            return Err(WalletError::WalletCreation("no relays configured".into()));
        }

        let mints = if mints.is_empty() {
            inner.settings.default_mints.clone()
        } else {
            mints
        };
        if mints.is_empty() {
            return Err(WalletError::WalletCreation("no mints configured".into()));
        }

        let mut clients = Vec::with_capacity(mints.len());
        for url in &mints {
            let client = inner
                .connector
                .connect(url)
                .await
                .map_err(|e| WalletError::WalletCreation(format!("mint {url}: {e}")))?;
            clients.push(client);
        }

        let unit = inner.settings.unit.clone();
        let p2pk = SecretKey::generate();

        let mut definition = WalletDefinition::new(mints.clone()).with_relays(relays.clone());
        definition.unit = unit.clone();
        if let Some(ref name) = name {
            definition = definition.with_name(name.clone());
        }
        let public_tags = definition.to_content_tags();
        let sealed = definition
            .with_privkey(p2pk.to_hex())
            .to_content()
            .map_err(|e| WalletError::WalletCreation(e.to_string()))?;
        let content = signer
            .nip04_encrypt(&owner, &sealed)
            .await
            .map_err(|e| WalletError::WalletCreation(e.to_string()))?;

        let outcome = inner
            .session
            .publish(WALLET_KIND, content, public_tags)
            .await
            .map_err(|e| WalletError::WalletCreation(e.to_string()))?;
        if !outcome.is_delivered() {
            warn!("Wallet definition {} reached no relay", outcome.event.id);
        }
        *inner.state.write().await = WalletState::Created;

        let mut nutzap_info = NutzapInfo::new(p2pk.public_key().to_hex());
        for relay in &relays {
            nutzap_info = nutzap_info.with_relay(relay.clone());
        }
        for url in &mints {
            nutzap_info =
                nutzap_info.with_mint(MintInfo::new(url.clone()).with_units(vec![unit.clone()]));
        }
        let outcome = inner
            .session
            .publish(NUTZAP_INFO_KIND, "", nutzap_info.to_tags())
            .await
            .map_err(|e| WalletError::WalletCreation(e.to_string()))?;
        if !outcome.is_delivered() {
            warn!("Nutzap info {} reached no relay", outcome.event.id);
        }

        *inner.mints.write().await = clients;
        *inner.config.write().await = Some(WalletConfig {
            name,
            mints: mints.clone(),
            relays,
            p2pk: Some(p2pk),
            unit,
        });
        *inner.state.write().await = WalletState::Active;

        info!("Wallet for {} active with {} mints", owner, mints.len());
        inner.emit(WalletEvent::Created { mints });
        inner.emit_balance().await;
        Ok(())
    }

    pub async fn state(&self) -> WalletState {
        *self.inner.state.read().await
    }

    pub async fn config(&self) -> Option<WalletConfig> {
        self.inner.config.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.inner.events.subscribe()
    }

    /// Non-zero balance per unit.
    pub async fn balance(&self) -> Vec<UnitBalance> {
        self.inner.proofs.lock().await.unit_balances()
    }

    pub async fn balance_map(&self) -> BTreeMap<String, u64> {
        self.inner.proofs.lock().await.balance()
    }

    /// Recompute the balance from the proof store and broadcast it.
    pub async fn resync_balance(&self) -> Vec<UnitBalance> {
        self.inner.emit_balance().await
    }

    pub async fn pending_deposit(&self) -> Option<Deposit> {
        self.inner
            .pending
            .lock()
            .await
            .as_ref()
            .map(|pending| pending.deposit.clone())
    }

    /// Ask the first mint for an invoice and watch it in the background.
    ///
    /// A previous pending deposit is cancelled; its invoice can still be paid
    /// but this wallet stops waiting for it.
    pub async fn initiate_deposit(&self, amount: u64) -> Result<Deposit> {
        self.require_active().await?;
        if amount == 0 {
            return Err(WalletError::InvalidAmount("deposit must be at least 1".into()));
        }

        let mint = self
            .inner
            .mints
            .read()
            .await
            .first()
            .cloned()
            .ok_or(WalletError::NoMint)?;
        let quote = mint
            .create_mint_quote(amount, &self.inner.settings.unit)
            .await?;

        let (tx, rx) = watch::channel(None);
        let deposit = Deposit {
            invoice: quote.request,
            quote_id: quote.id.clone(),
            mint: mint.url().to_string(),
            amount: quote.amount,
            done: rx,
        };
        let cancel = self.inner.shutdown.child_token();

        let previous = self.inner.pending.lock().await.replace(PendingDeposit {
            deposit: deposit.clone(),
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!(
                "Deposit {} replaced by {}",
                previous.deposit.quote_id, quote.id
            );
            previous.cancel.cancel();
        }

        info!("Deposit of {} {} pending at {}", amount, quote.unit, deposit.mint);
        tokio::spawn(watch_deposit(
            self.inner.clone(),
            mint,
            quote.id,
            quote.unit,
            tx,
            cancel,
        ));
        Ok(deposit)
    }

    /// Stop waiting for the pending deposit, if any.
    pub async fn cancel_deposit(&self) {
        if let Some(pending) = self.inner.pending.lock().await.take() {
            pending.cancel.cancel();
        }
    }

    /// Pay `amount` to `recipient` as a nutzap.
    ///
    /// The signer is asked to sign a draft of the nutzap before any proofs
    /// are swapped, and proofs leave the store only after the mint has
    /// swapped them, so a declined signature or a mint failure never changes
    /// the balance. If the signer gives out between the swap and the final
    /// signature the locked proofs are held, not dropped: the call fails with
    /// [`WalletError::NutzapHeld`] and [`retry_held_nutzaps`] delivers them.
    ///
    /// [`retry_held_nutzaps`]: CashuWallet::retry_held_nutzaps
    pub async fn send_nutzap(
        &self,
        recipient: &PublicKey,
        amount: u64,
        comment: &str,
    ) -> Result<NutzapReceipt> {
        self.require_active().await?;
        if amount == 0 {
            return Err(WalletError::InvalidAmount("nutzap must be at least 1".into()));
        }
        let config = self.config().await.ok_or(WalletError::NotActive)?;

        let _sending = self.inner.send_lock.lock().await;

        let info = self.recipient_info(recipient, &config).await;
        let (mint_url, proofs) = {
            let store = self.inner.proofs.lock().await;
            let mint_url = choose_mint(&store, &info, &config, amount)?;
            let proofs = store
                .take_for_amount(&mint_url, &config.unit, amount)
                .ok_or_else(|| WalletError::InsufficientBalance {
                    required: amount,
                    available: store.balance_for(&mint_url, &config.unit),
                })?;
            (mint_url, proofs)
        };

        let draft = Nutzap::new(
            Vec::new(),
            mint_url.clone(),
            config.unit.clone(),
            recipient.to_hex(),
        )
        .with_comment(comment);
        self.inner
            .session
            .sign(EventTemplate::new(NUTZAP_KIND, comment).with_tags(draft.to_tags()?))
            .await?;

        let client = self.inner.mint_client(&mint_url).await?;
        let SendSplit { send, keep } = client
            .swap_send(proofs.clone(), amount, &info.p2pk_lock())
            .await?;
        let change = crate::mint::sum(&keep);

        {
            let mut store = self.inner.proofs.lock().await;
            store.remove(&mint_url, &config.unit, &proofs);
            store.insert(&mint_url, &config.unit, keep);
        }

        let nutzap = Nutzap::new(send, mint_url, config.unit, recipient.to_hex())
            .with_comment(comment);
        let outcome = match self.inner.publish_nutzap(&nutzap).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Holding swapped nutzap to {}: {}", recipient, e);
                self.inner.held.lock().await.push(nutzap);
                self.inner.emit_balance().await;
                return Err(WalletError::NutzapHeld {
                    amount,
                    reason: e.to_string(),
                });
            }
        };
        self.inner.emit_balance().await;
        Ok(self.inner.nutzap_sent(nutzap, change, outcome))
    }

    /// Nutzaps that were swapped but never signed.
    pub async fn held_nutzaps(&self) -> Vec<Nutzap> {
        self.inner.held.lock().await.clone()
    }

    /// Sign and publish every held nutzap.
    ///
    /// Nutzaps that still cannot be signed stay held. Fails only when none
    /// went out.
    pub async fn retry_held_nutzaps(&self) -> Result<Vec<NutzapReceipt>> {
        self.require_active().await?;
        let _sending = self.inner.send_lock.lock().await;

        let held = std::mem::take(&mut *self.inner.held.lock().await);
        let mut receipts = Vec::new();
        let mut failure = None;
        for nutzap in held {
            match self.inner.publish_nutzap(&nutzap).await {
                Ok(outcome) => receipts.push(self.inner.nutzap_sent(nutzap, 0, outcome)),
                Err(e) => {
                    debug!("Nutzap to {} still held: {}", nutzap.recipient_pubkey, e);
                    self.inner.held.lock().await.push(nutzap);
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) if receipts.is_empty() => Err(e),
            _ => Ok(receipts),
        }
    }

    /// Send one sat to an `npub` (or hex) key.
    pub async fn send_one_sat_to_npub(&self, recipient: &str) -> Result<NutzapReceipt> {
        let recipient = PublicKey::parse(recipient)?;
        self.send_nutzap(&recipient, 1, "").await
    }

    async fn require_active(&self) -> Result<()> {
        match self.state().await {
            WalletState::Active => Ok(()),
            _ => Err(WalletError::NotActive),
        }
    }

    /// The recipient's newest kind 10019, or our own mints and relays with
    /// their Nostr key as the lock when they never published one.
    async fn recipient_info(&self, recipient: &PublicKey, config: &WalletConfig) -> NutzapInfo {
        let filter = Filter::new()
            .kind(NUTZAP_INFO_KIND)
            .author(recipient)
            .limit(1);
        let events = match self.inner.session.fetch(vec![filter]).await {
            Ok(outcome) => outcome.sorted(),
            Err(e) => {
                debug!("Nutzap info lookup for {} failed: {}", recipient, e);
                Vec::new()
            }
        };
        newest_nutzap_info(&events, recipient)
            .unwrap_or_else(|| fallback_nutzap_info(recipient, config))
    }
}

impl WalletInner {
    fn emit(&self, event: WalletEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn emit_balance(&self) -> Vec<UnitBalance> {
        let balances = self.proofs.lock().await.unit_balances();
        self.emit(WalletEvent::BalanceUpdated(balances.clone()));
        balances
    }

    async fn publish_nutzap(&self, nutzap: &Nutzap) -> Result<PublishOutcome> {
        let tags = nutzap.to_tags()?;
        let outcome = self
            .session
            .publish(NUTZAP_KIND, nutzap.comment.clone(), tags)
            .await?;
        if !outcome.is_delivered() {
            warn!(
                "Nutzap {} to {} reached no relay",
                outcome.event.id, nutzap.recipient_pubkey
            );
        }
        Ok(outcome)
    }

    fn nutzap_sent(&self, nutzap: Nutzap, change: u64, outcome: PublishOutcome) -> NutzapReceipt {
        let amount = nutzap.total_amount();
        info!(
            "Sent {} {} to {} via {}",
            amount, nutzap.unit, nutzap.recipient_pubkey, nutzap.mint_url
        );
        self.emit(WalletEvent::NutzapSent {
            event_id: outcome.event.id.clone(),
            recipient: nutzap.recipient_pubkey,
            mint: nutzap.mint_url.clone(),
            amount,
        });
        NutzapReceipt {
            mint: nutzap.mint_url,
            amount,
            change,
            outcome,
        }
    }

    async fn mint_client(&self, url: &str) -> Result<Arc<dyn MintClient>> {
        if let Some(client) = self.mints.read().await.iter().find(|m| m.url() == url) {
            return Ok(client.clone());
        }
        self.connector.connect(url).await
    }

    /// Redeem a paid quote and store the proofs.
    async fn redeem(&self, mint: &Arc<dyn MintClient>, quote_id: &str, unit: &str) -> Result<u64> {
        let proofs = mint.mint(quote_id).await?;
        let amount = crate::mint::sum(&proofs);
        let added = self.proofs.lock().await.insert(mint.url(), unit, proofs);
        debug!("Stored {} new proofs from {}", added, mint.url());
        Ok(amount)
    }

    async fn clear_pending(&self, quote_id: &str) {
        let mut pending = self.pending.lock().await;
        if pending
            .as_ref()
            .is_some_and(|p| p.deposit.quote_id == quote_id)
        {
            *pending = None;
        }
    }
}

/// Poll a quote until it is paid, expires, or the deposit is cancelled.
async fn watch_deposit(
    inner: Arc<WalletInner>,
    mint: Arc<dyn MintClient>,
    quote_id: String,
    unit: String,
    done: watch::Sender<Option<DepositStatus>>,
    cancel: CancellationToken,
) {
    let interval = inner.settings.deposit_poll_interval();
    let status = loop {
        tokio::select! {
            _ = cancel.cancelled() => break DepositStatus::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }

        let quote = match mint.mint_quote_state(&quote_id).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!("Polling deposit {} failed, retrying: {}", quote_id, e);
                continue;
            }
        };
        match quote.state {
            MintQuoteState::Unpaid => continue,
            MintQuoteState::Paid => match inner.redeem(&mint, &quote_id, &unit).await {
                Ok(amount) => break DepositStatus::Settled { amount },
                Err(e) => warn!("Redeeming deposit {} failed, retrying: {}", quote_id, e),
            },
            MintQuoteState::Issued => {
                break DepositStatus::Failed("quote was already redeemed".into());
            }
            MintQuoteState::Expired => break DepositStatus::Expired,
        }
    };

    inner.clear_pending(&quote_id).await;
    match &status {
        DepositStatus::Settled { amount } => {
            info!("Deposit {} settled: {} {}", quote_id, amount, unit);
            inner.emit(WalletEvent::DepositSettled {
                quote_id: quote_id.clone(),
                mint: mint.url().to_string(),
                amount: *amount,
            });
            inner.emit_balance().await;
        }
        DepositStatus::Expired => {
            info!("Deposit {} expired unpaid", quote_id);
            inner.emit(WalletEvent::DepositExpired {
                quote_id: quote_id.clone(),
            });
        }
        DepositStatus::Cancelled => debug!("Stopped watching deposit {}", quote_id),
        DepositStatus::Failed(reason) => warn!("Deposit {} failed: {}", quote_id, reason),
    }
    // The caller may have dropped every handle.
    let _ = done.send(Some(status));
}

/// Newest well-formed kind 10019 authored by `recipient`.
pub fn newest_nutzap_info(events: &[Event], recipient: &PublicKey) -> Option<NutzapInfo> {
    let author = recipient.to_hex();
    let mut candidates: Vec<&Event> = events
        .iter()
        .filter(|e| e.kind == NUTZAP_INFO_KIND && e.pubkey == author)
        .collect();
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    candidates.into_iter().find_map(|event| match NutzapInfo::from_event(event) {
        Ok(info) => Some(info),
        Err(e) => {
            debug!("Nutzap info {} is malformed: {}", event.id, e);
            None
        }
    })
}

fn fallback_nutzap_info(recipient: &PublicKey, config: &WalletConfig) -> NutzapInfo {
    let mut info = NutzapInfo::new(recipient.to_hex());
    if let Some(relay) = config.relays.first() {
        info = info.with_relay(relay.clone());
    }
    if let Some(mint) = config.mints.first() {
        info = info.with_mint(MintInfo::new(mint.clone()).with_units(vec![config.unit.clone()]));
    }
    info
}

/// Pick the mint to pay from.
///
/// Prefers a mint the recipient lists that is also one of ours, then any
/// recipient mint we hold enough funds in.
fn choose_mint(
    store: &ProofStore,
    info: &NutzapInfo,
    config: &WalletConfig,
    amount: u64,
) -> Result<String> {
    let funded = store.mints_with_at_least(&config.unit, amount);
    let accepted: Vec<&str> = info
        .mints
        .iter()
        .filter(|m| m.supports_unit(&config.unit))
        .map(|m| m.url.as_str())
        .filter(|url| funded.iter().any(|f| f == url))
        .collect();

    if let Some(shared) = accepted
        .iter()
        .find(|url| config.mints.iter().any(|m| m == *url))
    {
        return Ok(shared.to_string());
    }
    if let Some(first) = accepted.first() {
        return Ok(first.to_string());
    }

    let available = store.balance().get(&config.unit).copied().unwrap_or(0);
    if available < amount {
        return Err(WalletError::InsufficientBalance {
            required: amount,
            available,
        });
    }
    let listed: Vec<&str> = info.mints.iter().map(|m| m.url.as_str()).collect();
    Err(WalletError::NoCommonMint(listed.join(", ")))
}
