//! Wallet implementation for the ledger
//!
//! A wallet is a set of tracked scripts plus the ownership index derived from
//! them. Keys live in an external key manager; scripts are either derived
//! from the wallet seed or imported by the host.

use crate::core::error::LedgerError;
use crate::core::fee::FeePolicy;
use crate::core::ledger::{OutputId, OutputLedger};
use crate::core::maturity::MaturityPolicy;
use crate::crypto::derive_script;
use crate::wallet::balance::{self, BalanceBreakdown};
use crate::wallet::builder::{self, SpendContext, UnsignedSpend};
use crate::wallet::ownership::OwnershipIndex;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scripts the wallet considers its own
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedScripts(BTreeSet<String>);

impl TrackedScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, script: String) -> bool {
        self.0.insert(script)
    }

    pub fn contains(&self, script: &str) -> bool {
        self.0.contains(script)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Serializable wallet data for persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletData {
    pub seed: String,
    pub next_index: u32,
    pub scripts: TrackedScripts,
}

#[derive(Debug, Clone)]
pub struct Wallet {
    seed: String,
    next_index: u32,
    scripts: TrackedScripts,
    index: OwnershipIndex,
}

impl Wallet {
    /// Create a wallet whose primary script is derived from `seed`
    pub fn new(seed: &str) -> Self {
        let mut scripts = TrackedScripts::new();
        scripts.insert(derive_script(seed, 0));
        Self {
            seed: seed.to_string(),
            next_index: 1,
            scripts,
            index: OwnershipIndex::new(),
        }
    }

    /// Script receiving genesis stake and change
    pub fn primary_script(&self) -> String {
        derive_script(&self.seed, 0)
    }

    /// Derive and track a fresh script
    pub fn new_script(&mut self) -> String {
        let script = derive_script(&self.seed, self.next_index);
        self.next_index += 1;
        self.scripts.insert(script.clone());
        script
    }

    /// Track a script handed over by the key manager.
    ///
    /// Outputs already in the ledger are only picked up by a rescan.
    pub fn track_script(&mut self, script: &str) -> bool {
        self.scripts.insert(script.to_string())
    }

    pub fn is_mine(&self, script: &str) -> bool {
        self.scripts.contains(script)
    }

    pub fn scripts(&self) -> &TrackedScripts {
        &self.scripts
    }

    pub fn index(&self) -> &OwnershipIndex {
        &self.index
    }

    pub fn set_index(&mut self, index: OwnershipIndex) {
        self.index = index;
    }

    /// Fold outputs a block just created into the index
    pub fn note_outputs(&mut self, ledger: &OutputLedger, created: &[OutputId]) -> usize {
        self.index.note_outputs(ledger, created, &self.scripts)
    }

    /// Index re-derived for `from..=to`, leaving the wallet untouched
    pub fn rescanned_index(
        &self,
        ledger: &OutputLedger,
        from: u64,
        to: u64,
        tip: u64,
    ) -> Result<(OwnershipIndex, usize), LedgerError> {
        if from > to || to > tip {
            return Err(LedgerError::InvalidRange { from, to, tip });
        }

        let mut index = self.index.clone();
        let found = index.rescan(ledger, &self.scripts, from, to);
        info!(
            "Rescanned heights {}..={}: {} owned outputs, {} total",
            from,
            to,
            found,
            index.len()
        );
        Ok((index, found))
    }

    /// Re-derive ownership for `from..=to` in place
    pub fn rescan(
        &mut self,
        ledger: &OutputLedger,
        from: u64,
        to: u64,
        tip: u64,
    ) -> Result<usize, LedgerError> {
        let (index, found) = self.rescanned_index(ledger, from, to, tip)?;
        self.index = index;
        Ok(found)
    }

    /// Get the spendable balance at `height`
    pub fn balance(
        &self,
        ledger: &OutputLedger,
        policy: &MaturityPolicy,
        height: u64,
    ) -> Result<u64, LedgerError> {
        balance::balance(ledger, &self.index, policy, height)
    }

    pub fn breakdown(
        &self,
        ledger: &OutputLedger,
        policy: &MaturityPolicy,
        height: u64,
    ) -> Result<BalanceBreakdown, LedgerError> {
        balance::breakdown(ledger, &self.index, policy, height)
    }

    /// Create an unsigned transaction paying `amount` to `destination`
    pub fn build_spend(
        &self,
        ledger: &OutputLedger,
        policy: &MaturityPolicy,
        fee: &FeePolicy,
        destination: &str,
        amount: u64,
        height: u64,
    ) -> Result<UnsignedSpend, LedgerError> {
        let ctx = SpendContext {
            ledger,
            index: &self.index,
            policy,
            fee,
            height,
        };
        builder::build_spend(&ctx, destination, &self.primary_script(), amount)
    }

    /// Export everything but the derived index
    pub fn to_data(&self) -> WalletData {
        WalletData {
            seed: self.seed.clone(),
            next_index: self.next_index,
            scripts: self.scripts.clone(),
        }
    }

    /// Restore a wallet; its index is empty until the next rescan
    pub fn from_data(data: WalletData) -> Self {
        let mut scripts = data.scripts;
        scripts.insert(derive_script(&data.seed, 0));
        Self {
            seed: data.seed,
            next_index: data.next_index.max(1),
            scripts,
            index: OwnershipIndex::new(),
        }
    }
}
