//! Ledger node
//!
//! Pairs the chain side (Block Applier and Output Ledger) with one wallet and
//! keeps the wallet's ownership index in step with every committed block.

use crate::core::{
    ApplyOutcome, Block, BlockApplier, ChainStats, FeePolicy, LedgerConfig, LedgerError,
    OutPoint, Transaction,
};
use crate::snapshot::Snapshot;
use crate::wallet::{BalanceBreakdown, OwnershipIndex, UnsignedSpend, Wallet};
use log::info;

#[derive(Debug)]
pub struct Node {
    chain: BlockApplier,
    wallet: Wallet,
    config: LedgerConfig,
}

impl Node {
    /// Start a node from an explicit genesis block.
    ///
    /// Any index the wallet carries refers to another ledger and is discarded.
    pub fn new(
        config: LedgerConfig,
        mut wallet: Wallet,
        genesis: Block,
    ) -> Result<Self, LedgerError> {
        let chain = BlockApplier::new(genesis, config.maturity)?;
        wallet.set_index(OwnershipIndex::new());
        let mut node = Self {
            chain,
            wallet,
            config,
        };
        node.wallet.rescan(node.chain.ledger(), 0, 0, 0)?;
        Ok(node)
    }

    /// Start a node whose genesis stakes `allocation` to the wallet
    pub fn with_stake(
        config: LedgerConfig,
        wallet: Wallet,
        allocation: u64,
    ) -> Result<Self, LedgerError> {
        let genesis = Block::genesis(&[(wallet.primary_script(), allocation)]);
        Self::new(config, wallet, genesis)
    }

    fn replay_blocks(
        config: LedgerConfig,
        wallet: Wallet,
        blocks: Vec<Block>,
    ) -> Result<Self, LedgerError> {
        let mut blocks = blocks.into_iter();
        let genesis = blocks
            .next()
            .ok_or_else(|| LedgerError::InvalidBlock("chain has no genesis block".to_string()))?;

        let mut node = Self::new(config, wallet, genesis)?;
        for block in blocks {
            if let ApplyOutcome::Rejected(err) = node.apply_block(block)? {
                return Err(err);
            }
        }
        Ok(node)
    }

    /// Rebuild a node by replaying a stored chain from genesis, then
    /// rescanning the whole chain with the wallet's current scripts
    pub fn replay(
        config: LedgerConfig,
        wallet: Wallet,
        blocks: Vec<Block>,
    ) -> Result<Self, LedgerError> {
        let mut node = Self::replay_blocks(config, wallet, blocks)?;
        let tip = node.tip();
        node.wallet.rescan(node.chain.ledger(), 0, tip, tip)?;
        info!("Replayed chain to height {}", tip);
        Ok(node)
    }

    /// Replay a stored chain and reinstate the ownership the wallet had when
    /// it was saved. Scripts tracked since the last rescan stay unscanned.
    pub fn restore(
        config: LedgerConfig,
        wallet: Wallet,
        blocks: Vec<Block>,
        owned: &[OutPoint],
    ) -> Result<Self, LedgerError> {
        let mut node = Self::replay_blocks(config, wallet, blocks)?;
        let index = OwnershipIndex::from_outpoints(node.chain.ledger(), node.wallet.scripts(), owned)?;
        node.wallet.set_index(index);
        info!(
            "Restored chain to height {} with {} owned outputs",
            node.tip(),
            owned.len()
        );
        Ok(node)
    }

    /// Owned outputs in a form that survives a replay
    pub fn owned_outpoints(&self) -> Vec<OutPoint> {
        self.wallet.index().owned_outpoints(self.chain.ledger())
    }

    /// Apply a block and note any outputs the wallet owns
    pub fn apply_block(&mut self, block: Block) -> Result<ApplyOutcome, LedgerError> {
        let outcome = self.chain.apply_block(block)?;
        if let ApplyOutcome::Applied { created, .. } = &outcome {
            self.wallet.note_outputs(self.chain.ledger(), created);
        }
        Ok(outcome)
    }

    /// Wrap `transactions` in the next block and apply it
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<ApplyOutcome, LedgerError> {
        let block = Block::new(
            self.tip() + 1,
            self.chain.tip_hash().to_string(),
            transactions,
        );
        self.apply_block(block)
    }

    /// Extend the chain by `count` blocks, each paying `reward` to `script`
    /// when both are given
    pub fn generate(
        &mut self,
        count: u64,
        reward: Option<(&str, u64)>,
    ) -> Result<Vec<ApplyOutcome>, LedgerError> {
        let mut outcomes = Vec::new();
        for _ in 0..count {
            let transactions = match reward {
                Some((script, amount)) if amount > 0 => {
                    vec![Transaction::coinbase(script, amount, self.tip() + 1)]
                }
                _ => Vec::new(),
            };
            let outcome = self.mine_block(transactions)?;
            let rejected = !outcome.is_applied();
            outcomes.push(outcome);
            if rejected {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Spendable balance, at the tip unless a height is given
    pub fn get_balance(&self, height: Option<u64>) -> Result<u64, LedgerError> {
        let height = height.unwrap_or_else(|| self.tip());
        self.wallet
            .balance(self.chain.ledger(), self.chain.policy(), height)
    }

    pub fn breakdown(&self, height: Option<u64>) -> Result<BalanceBreakdown, LedgerError> {
        let height = height.unwrap_or_else(|| self.tip());
        self.wallet
            .breakdown(self.chain.ledger(), self.chain.policy(), height)
    }

    pub fn rescan(&mut self, from: u64, to: u64) -> Result<usize, LedgerError> {
        let tip = self.tip();
        self.wallet.rescan(self.chain.ledger(), from, to, tip)
    }

    /// Build an unsigned spend from outputs mature at the tip
    pub fn build_spend(&self, destination: &str, amount: u64) -> Result<UnsignedSpend, LedgerError> {
        self.wallet.build_spend(
            self.chain.ledger(),
            self.chain.policy(),
            &self.config.fee,
            destination,
            amount,
            self.tip(),
        )
    }

    pub fn new_address(&mut self) -> String {
        self.wallet.new_script()
    }

    pub fn track_script(&mut self, script: &str) -> bool {
        self.wallet.track_script(script)
    }

    pub fn verify_integrity(&mut self) -> Result<(), LedgerError> {
        self.chain.verify_integrity()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.chain.snapshot()
    }

    pub fn stats(&self) -> ChainStats {
        self.chain.stats()
    }

    pub fn tip(&self) -> u64 {
        self.chain.tip()
    }

    pub fn chain(&self) -> &BlockApplier {
        &self.chain
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Replace the fee policy used for new spends
    pub fn set_fee_policy(&mut self, fee: FeePolicy) {
        self.config.fee = fee;
    }

    pub fn into_parts(self) -> (BlockApplier, Wallet, LedgerConfig) {
        (self.chain, self.wallet, self.config)
    }
}
