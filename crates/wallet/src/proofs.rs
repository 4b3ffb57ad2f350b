//! Unspent proofs held by the wallet.
//!
//! Proofs are grouped by mint URL and unit, then keyed by secret so the same
//! proof can never be counted twice. Balances are saturating sums over the
//! store and therefore never negative.

use crate::events::UnitBalance;
use crate::mint::sum;
use nostr::Proof;
use std::collections::BTreeMap;

type Bucket = BTreeMap<String, Proof>;

#[derive(Debug, Clone, Default)]
pub struct ProofStore {
    buckets: BTreeMap<(String, String), Bucket>,
}

impl ProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add proofs, ignoring secrets already held. Returns how many were new.
    pub fn insert(&mut self, mint: &str, unit: &str, proofs: Vec<Proof>) -> usize {
        let bucket = self
            .buckets
            .entry((mint.to_string(), unit.to_string()))
            .or_default();
        let mut added = 0;
        for proof in proofs {
            if !bucket.contains_key(&proof.secret) {
                bucket.insert(proof.secret.clone(), proof);
                added += 1;
            }
        }
        added
    }

    /// Drop spent proofs by secret.
    pub fn remove(&mut self, mint: &str, unit: &str, proofs: &[Proof]) {
        let key = (mint.to_string(), unit.to_string());
        if let Some(bucket) = self.buckets.get_mut(&key) {
            for proof in proofs {
                bucket.remove(&proof.secret);
            }
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    pub fn proofs(&self, mint: &str, unit: &str) -> Vec<Proof> {
        self.buckets
            .get(&(mint.to_string(), unit.to_string()))
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn balance_for(&self, mint: &str, unit: &str) -> u64 {
        self.buckets
            .get(&(mint.to_string(), unit.to_string()))
            .map(|bucket| {
                bucket
                    .values()
                    .fold(0u64, |acc, p| acc.saturating_add(p.amount))
            })
            .unwrap_or(0)
    }

    /// Total per unit across all mints.
    pub fn balance(&self) -> BTreeMap<String, u64> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for (mint, unit) in self.buckets.keys() {
            let entry = totals.entry(unit.clone()).or_default();
            *entry = entry.saturating_add(self.balance_for(mint, unit));
        }
        totals
    }

    /// Non-zero balances in unit order.
    pub fn unit_balances(&self) -> Vec<UnitBalance> {
        self.balance()
            .into_iter()
            .filter(|(_, amount)| *amount > 0)
            .map(|(unit, amount)| UnitBalance::new(unit, amount))
            .collect()
    }

    /// Choose proofs from one mint covering `amount`, or `None` if the mint
    /// holds too little. The store is not modified.
    ///
    /// Largest denominations first, then the smallest single proof that
    /// closes the remaining gap, which keeps the change small.
    pub fn take_for_amount(&self, mint: &str, unit: &str, amount: u64) -> Option<Vec<Proof>> {
        if amount == 0 || self.balance_for(mint, unit) < amount {
            return None;
        }

        let mut available = self.proofs(mint, unit);
        available.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.secret.cmp(&b.secret)));

        let mut selected = Vec::new();
        let mut remaining = amount;
        let mut rest = Vec::new();
        for proof in available {
            if proof.amount <= remaining {
                remaining -= proof.amount;
                selected.push(proof);
            } else {
                rest.push(proof);
            }
            if remaining == 0 {
                return Some(selected);
            }
        }

        // Every proof left is larger than the gap; take the smallest one.
        let closer = rest.into_iter().min_by_key(|p| p.amount)?;
        if closer.amount >= amount {
            return Some(vec![closer]);
        }
        selected.push(closer);
        (sum(&selected) >= amount).then_some(selected)
    }

    /// Mints holding at least `amount` of `unit`, richest first.
    pub fn mints_with_at_least(&self, unit: &str, amount: u64) -> Vec<String> {
        let mut mints: Vec<(String, u64)> = self
            .buckets
            .keys()
            .filter(|(_, u)| u == unit)
            .map(|(mint, u)| (mint.clone(), self.balance_for(mint, u)))
            .filter(|(_, balance)| *balance >= amount)
            .collect();
        mints.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        mints.into_iter().map(|(mint, _)| mint).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
