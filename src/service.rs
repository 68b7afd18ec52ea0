//! Shared ledger service
//!
//! Chain state and wallet sit behind separate `RwLock`s so balance queries
//! run concurrently with each other while block application is serialized.
//! Locks are always taken chain first, then wallet.

use crate::core::{ApplyOutcome, Block, BlockApplier, LedgerConfig, LedgerError};
use crate::node::Node;
use crate::wallet::{BalanceBreakdown, UnsignedSpend, Wallet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct LedgerService {
    chain: Arc<RwLock<BlockApplier>>,
    wallet: Arc<RwLock<Wallet>>,
    config: LedgerConfig,
}

impl LedgerService {
    pub fn new(node: Node) -> Self {
        let (chain, wallet, config) = node.into_parts();
        Self {
            chain: Arc::new(RwLock::new(chain)),
            wallet: Arc::new(RwLock::new(wallet)),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub async fn apply_block(&self, block: Block) -> Result<ApplyOutcome, LedgerError> {
        let mut chain = self.chain.write().await;
        let outcome = chain.apply_block(block)?;
        if let ApplyOutcome::Applied { created, .. } = &outcome {
            let mut wallet = self.wallet.write().await;
            wallet.note_outputs(chain.ledger(), created);
        }
        Ok(outcome)
    }

    pub async fn get_balance(&self, height: Option<u64>) -> Result<u64, LedgerError> {
        let chain = self.chain.read().await;
        let wallet = self.wallet.read().await;
        let height = height.unwrap_or_else(|| chain.tip());
        wallet.balance(chain.ledger(), chain.policy(), height)
    }

    pub async fn breakdown(&self, height: Option<u64>) -> Result<BalanceBreakdown, LedgerError> {
        let chain = self.chain.read().await;
        let wallet = self.wallet.read().await;
        let height = height.unwrap_or_else(|| chain.tip());
        wallet.breakdown(chain.ledger(), chain.policy(), height)
    }

    /// Rescan `from..=to`.
    ///
    /// The chain read lock is held throughout so no block commits while the
    /// new index is folded; readers keep seeing the old index until the swap.
    pub async fn rescan(&self, from: u64, to: u64) -> Result<usize, LedgerError> {
        let chain = self.chain.read().await;
        let (index, found) = {
            let wallet = self.wallet.read().await;
            wallet.rescanned_index(chain.ledger(), from, to, chain.tip())?
        };
        self.wallet.write().await.set_index(index);
        Ok(found)
    }

    pub async fn build_spend(
        &self,
        destination: &str,
        amount: u64,
    ) -> Result<UnsignedSpend, LedgerError> {
        let chain = self.chain.read().await;
        let wallet = self.wallet.read().await;
        wallet.build_spend(
            chain.ledger(),
            chain.policy(),
            &self.config.fee,
            destination,
            amount,
            chain.tip(),
        )
    }

    pub async fn track_script(&self, script: &str) -> bool {
        self.wallet.write().await.track_script(script)
    }

    pub async fn tip(&self) -> (u64, String) {
        let chain = self.chain.read().await;
        (chain.tip(), chain.tip_hash().to_string())
    }
}
