//! Block Applier
//!
//! Consumes connected blocks one at a time. Every block is first validated
//! into a [`StagedBlock`] without touching the ledger; only a fully valid
//! block is committed, so a rejected block leaves no trace. A failure while
//! committing means the ledger itself is inconsistent, and the applier halts.

use crate::core::block::{null_hash, Block};
use crate::core::error::LedgerError;
use crate::core::ledger::{OutputId, OutputLedger, OutputRecord};
use crate::core::maturity::MaturityPolicy;
use crate::core::transaction::{OutPoint, OutputOrigin, Transaction, TxKind};
use crate::snapshot::{Snapshot, SnapshotHash};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};

/// Where the applier is in handling the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    Applying,
    Applied,
    Rejected,
}

/// Result of offering a block to the applier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        height: u64,
        hash: String,
        /// Outputs the block created, in block order
        created: Vec<OutputId>,
    },
    Rejected(LedgerError),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Validated effects of a block, not yet visible in the ledger
#[derive(Debug, Default)]
struct StagedBlock {
    /// Outputs created by the block
    created: HashMap<OutPoint, OutputRecord>,
    /// (spent output, spending tx) in block order
    spends: Vec<(OutPoint, String)>,
    spent: HashSet<OutPoint>,
    tx_ids: HashSet<String>,
}

/// Chain statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStats {
    pub height: u64,
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub total_outputs: u64,
    pub spent_outputs: u64,
    pub unspent_value: u64,
    pub latest_hash: String,
}

#[derive(Debug)]
pub struct BlockApplier {
    blocks: Vec<Block>,
    ledger: OutputLedger,
    policy: MaturityPolicy,
    state: ApplyState,
    /// Set once the ledger is found inconsistent
    halted: Option<String>,
    /// Multiset hash of the unspent set at the tip
    utxo_hash: SnapshotHash,
}

impl BlockApplier {
    /// Start a chain from its genesis block
    pub fn new(genesis: Block, policy: MaturityPolicy) -> Result<Self, LedgerError> {
        let mut applier = Self {
            blocks: Vec::new(),
            ledger: OutputLedger::new(),
            policy,
            state: ApplyState::Idle,
            halted: None,
            utxo_hash: SnapshotHash::new(),
        };

        match applier.apply_block(genesis)? {
            ApplyOutcome::Applied { .. } => Ok(applier),
            ApplyOutcome::Rejected(err) => Err(err),
        }
    }

    /// Apply the next block.
    ///
    /// `Ok(Rejected)` leaves all state unchanged. `Err` is returned only for
    /// fatal conditions, after which every later call fails with `Halted`.
    pub fn apply_block(&mut self, block: Block) -> Result<ApplyOutcome, LedgerError> {
        if let Some(reason) = &self.halted {
            return Err(LedgerError::Halted(reason.clone()));
        }

        self.state = ApplyState::Applying;

        let staged = match self.stage(&block) {
            Ok(staged) => staged,
            Err(err) => {
                warn!("Rejected block {} at height {}: {}", block.hash, block.height, err);
                self.state = ApplyState::Rejected;
                return Ok(ApplyOutcome::Rejected(err));
            }
        };

        let height = block.height;
        let hash = block.hash.clone();
        match self.commit(block, staged) {
            Ok(created) => {
                debug!(
                    "Applied block {} at height {} ({} new outputs)",
                    hash,
                    height,
                    created.len()
                );
                self.state = ApplyState::Applied;
                Ok(ApplyOutcome::Applied {
                    height,
                    hash,
                    created,
                })
            }
            Err(err) => {
                let reason = format!("commit of block {} at height {} failed: {}", hash, height, err);
                error!("{}", reason);
                self.halted = Some(reason.clone());
                self.state = ApplyState::Rejected;
                Err(LedgerError::Corrupted(reason))
            }
        }
    }

    /// Validate a block against the current tip without mutating anything
    fn stage(&self, block: &Block) -> Result<StagedBlock, LedgerError> {
        let expected_height = self.blocks.len() as u64;
        if block.height != expected_height {
            return Err(LedgerError::InvalidHeight {
                height: block.height,
                reference: expected_height,
            });
        }

        let expected_parent = self
            .blocks
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(null_hash);
        if block.previous_hash != expected_parent {
            return Err(LedgerError::UnexpectedParent {
                expected: expected_parent,
                got: block.previous_hash.clone(),
            });
        }

        if !block.verify_hash() {
            return Err(LedgerError::InvalidBlock(format!(
                "hash mismatch for block at height {}",
                block.height
            )));
        }

        let mut staged = StagedBlock::default();
        for tx in &block.transactions {
            self.stage_transaction(tx, block.height, &mut staged)?;
        }
        Ok(staged)
    }

    fn stage_transaction(
        &self,
        tx: &Transaction,
        height: u64,
        staged: &mut StagedBlock,
    ) -> Result<(), LedgerError> {
        let invalid = |reason: String| LedgerError::InvalidSpend {
            tx_id: tx.id.clone(),
            reason,
        };

        if self.ledger.transaction_height(&tx.id).is_some() || !staged.tx_ids.insert(tx.id.clone())
        {
            return Err(LedgerError::DuplicateOutput(tx.outpoint(0)));
        }

        match tx.kind {
            TxKind::Coinbase if !tx.inputs.is_empty() => {
                return Err(invalid("coinbase transaction with inputs".to_string()))
            }
            TxKind::Regular if tx.inputs.is_empty() => {
                return Err(invalid("transaction without inputs".to_string()))
            }
            _ => {}
        }

        let mut input_total: u64 = 0;
        for input in &tx.inputs {
            let outpoint = input.outpoint();

            if staged.spent.contains(&outpoint) {
                return Err(LedgerError::DoubleSpend {
                    outpoint,
                    spent_by: staged
                        .spends
                        .iter()
                        .find(|(o, _)| *o == input.outpoint())
                        .map(|(_, by)| by.clone())
                        .unwrap_or_default(),
                    height,
                });
            }

            let record = match self.ledger.lookup(&outpoint) {
                Ok(view) => {
                    if let Some(spend) = view.spend {
                        return Err(LedgerError::DoubleSpend {
                            outpoint,
                            spent_by: spend.spending_tx.clone(),
                            height: spend.height,
                        });
                    }
                    view.record
                }
                Err(_) => staged
                    .created
                    .get(&outpoint)
                    .ok_or_else(|| invalid(format!("unknown output {}", outpoint)))?,
            };

            if !self.policy.is_spendable(record, height)? {
                return Err(invalid(format!(
                    "output {} created at height {} is immature",
                    outpoint, record.height
                )));
            }

            input_total = input_total
                .checked_add(record.amount())
                .ok_or_else(|| invalid("input value overflow".to_string()))?;
            staged.spent.insert(outpoint.clone());
            staged.spends.push((outpoint, tx.id.clone()));
        }

        let mut output_total: u64 = 0;
        for (index, output) in tx.outputs.iter().enumerate() {
            output_total = output_total
                .checked_add(output.amount)
                .ok_or_else(|| invalid("output value overflow".to_string()))?;

            let outpoint = tx.outpoint(index as u32);
            if self.ledger.contains(&outpoint) {
                return Err(LedgerError::DuplicateOutput(outpoint));
            }
            staged.created.insert(
                outpoint.clone(),
                OutputRecord {
                    outpoint,
                    output: output.clone(),
                    origin: OutputOrigin::from(tx.kind),
                    height,
                },
            );
        }

        if !tx.is_coinbase() && output_total > input_total {
            return Err(invalid(format!(
                "outputs {} exceed inputs {}",
                output_total, input_total
            )));
        }

        Ok(())
    }

    /// Make a staged block visible. Every error here is a broken invariant.
    fn commit(&mut self, block: Block, staged: StagedBlock) -> Result<Vec<OutputId>, LedgerError> {
        let height = block.height;
        let mut created = Vec::with_capacity(staged.created.len());

        for tx in &block.transactions {
            created.extend(self.ledger.record(&tx.id, tx.kind, &tx.outputs, height)?);
        }
        for id in &created {
            if let Some(view) = self.ledger.get(*id) {
                self.utxo_hash.add_utxo(view.record);
            }
        }

        for (outpoint, spender) in &staged.spends {
            let id = self.ledger.mark_spent(outpoint, spender, height)?;
            if let Some(view) = self.ledger.get(id) {
                self.utxo_hash.subtract_utxo(view.record);
            }
        }

        self.blocks.push(block);
        Ok(created)
    }

    /// Re-check ledger invariants; halts the applier if they do not hold
    pub fn verify_integrity(&mut self) -> Result<(), LedgerError> {
        let result = self.ledger.verify_integrity().and_then(|_| {
            if SnapshotHash::from_ledger(&self.ledger, self.tip()) != self.utxo_hash {
                Err(LedgerError::Corrupted(
                    "running UTXO hash diverged from ledger".to_string(),
                ))
            } else {
                Ok(())
            }
        });

        if let Err(err) = &result {
            error!("Integrity check failed, halting block application: {}", err);
            self.halted = Some(err.to_string());
        } else {
            info!("Integrity check passed at height {}", self.tip());
        }
        result
    }

    /// Snapshot of the unspent set at the tip
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.ledger, self.tip(), self.tip_hash())
    }

    /// Current tip height
    pub fn tip(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    pub fn tip_hash(&self) -> &str {
        self.blocks.last().map(|b| b.hash.as_str()).unwrap_or("")
    }

    pub fn block(&self, height: u64) -> Option<&Block> {
        self.blocks.get(height as usize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn ledger(&self) -> &OutputLedger {
        &self.ledger
    }

    pub fn policy(&self) -> &MaturityPolicy {
        &self.policy
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn utxo_hash(&self) -> &SnapshotHash {
        &self.utxo_hash
    }

    /// Get chain statistics
    pub fn stats(&self) -> ChainStats {
        let tip = self.tip();
        ChainStats {
            height: tip,
            total_blocks: self.blocks.len() as u64,
            total_transactions: self.ledger.transaction_count() as u64,
            total_outputs: self.ledger.len() as u64,
            spent_outputs: self.ledger.spent_count() as u64,
            unspent_value: self
                .ledger
                .unspent_at(tip)
                .map(|v| v.record.amount())
                .fold(0, u64::saturating_add),
            latest_hash: self.tip_hash().to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn ledger_mut(&mut self) -> &mut OutputLedger {
        &mut self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::maturity::GenesisPolicy;
    use crate::core::transaction::{TransactionBuilder, TransactionOutput};

    fn applier(window: u64) -> BlockApplier {
        let genesis = Block::genesis(&[("stake".to_string(), 10_000)]);
        BlockApplier::new(genesis, MaturityPolicy::new(window, GenesisPolicy::Matures)).unwrap()
    }

    fn next_block(applier: &BlockApplier, txs: Vec<Transaction>) -> Block {
        Block::new(applier.tip() + 1, applier.tip_hash().to_string(), txs)
    }

    fn mine_empty(applier: &mut BlockApplier, count: u64) {
        for _ in 0..count {
            let block = next_block(applier, vec![]);
            assert!(applier.apply_block(block).unwrap().is_applied());
        }
    }

    fn genesis_outpoint(applier: &BlockApplier) -> OutPoint {
        applier.block(0).unwrap().transactions[0].outpoint(0)
    }

    #[test]
    fn test_genesis_applied() {
        let applier = applier(100);
        assert_eq!(applier.tip(), 0);
        assert_eq!(applier.ledger().len(), 1);
        assert_eq!(applier.state(), ApplyState::Applied);
        assert_eq!(applier.stats().unspent_value, 10_000);
    }

    #[test]
    fn test_height_gap_rejected() {
        let mut applier = applier(100);
        let block = Block::new(2, applier.tip_hash().to_string(), vec![]);
        let outcome = applier.apply_block(block).unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Rejected(LedgerError::InvalidHeight {
                height: 2,
                reference: 1
            })
        );
        assert_eq!(applier.state(), ApplyState::Rejected);
        assert_eq!(applier.tip(), 0);
    }

    #[test]
    fn test_wrong_parent_rejected() {
        let mut applier = applier(100);
        let block = Block::new(1, null_hash(), vec![]);
        assert!(matches!(
            applier.apply_block(block).unwrap(),
            ApplyOutcome::Rejected(LedgerError::UnexpectedParent { .. })
        ));
    }

    #[test]
    fn test_immature_spend_rejected() {
        let mut applier = applier(100);
        mine_empty(&mut applier, 98);

        // Block 99 would be one block short of maturity
        let tx = TransactionBuilder::new()
            .add_input(&genesis_outpoint(&applier))
            .add_output("dest", 9_999)
            .build();
        let block = next_block(&applier, vec![tx.clone()]);
        assert!(matches!(
            applier.apply_block(block).unwrap(),
            ApplyOutcome::Rejected(LedgerError::InvalidSpend { .. })
        ));

        mine_empty(&mut applier, 1);
        let block = next_block(&applier, vec![tx]);
        assert!(applier.apply_block(block).unwrap().is_applied());
    }

    #[test]
    fn test_frozen_genesis_spend_rejected() {
        let genesis = Block::genesis(&[("stake".to_string(), 10_000)]);
        let mut applier =
            BlockApplier::new(genesis, MaturityPolicy::new(0, GenesisPolicy::Frozen)).unwrap();
        let tx = TransactionBuilder::new()
            .add_input(&genesis_outpoint(&applier))
            .add_output("dest", 9_999)
            .build();

        for _ in 0..3 {
            let block = next_block(&applier, vec![tx.clone()]);
            assert!(matches!(
                applier.apply_block(block).unwrap(),
                ApplyOutcome::Rejected(LedgerError::InvalidSpend { .. })
            ));
            mine_empty(&mut applier, 50);
        }
        assert_eq!(applier.ledger().spent_count(), 0);
        assert_eq!(applier.stats().unspent_value, 10_000);
    }

    #[test]
    fn test_block_is_atomic() {
        let mut applier = applier(0);
        let before_ledger = applier.ledger().len();
        let before_hash = *applier.utxo_hash();

        let good = TransactionBuilder::new()
            .add_input(&genesis_outpoint(&applier))
            .add_output("dest", 5_000)
            .add_output("change", 4_999)
            .build();
        let bad = TransactionBuilder::new()
            .add_input(&OutPoint::new("missing", 0))
            .add_output("dest", 1)
            .build();
        let block = next_block(&applier, vec![Transaction::coinbase("m", 5, 1), good, bad]);

        let outcome = applier.apply_block(block).unwrap();
        assert!(matches!(
            outcome,
            ApplyOutcome::Rejected(LedgerError::InvalidSpend { .. })
        ));
        assert_eq!(applier.tip(), 0);
        assert_eq!(applier.ledger().len(), before_ledger);
        assert_eq!(applier.ledger().spent_count(), 0);
        assert_eq!(*applier.utxo_hash(), before_hash);
    }

    #[test]
    fn test_double_spend_within_block() {
        let mut applier = applier(0);
        let outpoint = genesis_outpoint(&applier);
        let tx1 = TransactionBuilder::new()
            .add_input(&outpoint)
            .add_output("a", 10)
            .build();
        let tx2 = TransactionBuilder::new()
            .add_input(&outpoint)
            .add_output("b", 10)
            .build();

        let block = next_block(&applier, vec![tx1, tx2]);
        assert!(matches!(
            applier.apply_block(block).unwrap(),
            ApplyOutcome::Rejected(LedgerError::DoubleSpend { .. })
        ));
    }

    #[test]
    fn test_double_spend_across_blocks() {
        let mut applier = applier(0);
        let outpoint = genesis_outpoint(&applier);
        let tx1 = TransactionBuilder::new()
            .add_input(&outpoint)
            .add_output("a", 10)
            .build();
        let block = next_block(&applier, vec![tx1.clone()]);
        assert!(applier.apply_block(block).unwrap().is_applied());

        let tx2 = TransactionBuilder::new()
            .add_input(&outpoint)
            .add_output("b", 10)
            .lock_height(1)
            .build();
        let block = next_block(&applier, vec![tx2]);
        match applier.apply_block(block).unwrap() {
            ApplyOutcome::Rejected(LedgerError::DoubleSpend { spent_by, height, .. }) => {
                assert_eq!(spent_by, tx1.id);
                assert_eq!(height, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_value_creation_rejected() {
        let mut applier = applier(0);
        let tx = TransactionBuilder::new()
            .add_input(&genesis_outpoint(&applier))
            .add_output("a", 10_001)
            .build();
        let block = next_block(&applier, vec![tx]);
        assert!(matches!(
            applier.apply_block(block).unwrap(),
            ApplyOutcome::Rejected(LedgerError::InvalidSpend { .. })
        ));
    }

    #[test]
    fn test_spend_output_created_earlier_in_block() {
        let mut applier = applier(0);
        let tx1 = TransactionBuilder::new()
            .add_input(&genesis_outpoint(&applier))
            .add_output("a", 9_000)
            .build();
        let tx2 = TransactionBuilder::new()
            .add_input(&tx1.outpoint(0))
            .add_output("b", 8_000)
            .build();

        let block = next_block(&applier, vec![tx1, tx2]);
        assert!(applier.apply_block(block).unwrap().is_applied());
        assert_eq!(applier.stats().unspent_value, 8_000);
    }

    #[test]
    fn test_coinbase_in_same_block_is_immature() {
        let mut applier = applier(10);
        let reward = Transaction::coinbase("miner", 50, 1);
        let spend = TransactionBuilder::new()
            .add_input(&reward.outpoint(0))
            .add_output("x", 50)
            .build();

        let block = next_block(&applier, vec![reward, spend]);
        assert!(matches!(
            applier.apply_block(block).unwrap(),
            ApplyOutcome::Rejected(LedgerError::InvalidSpend { .. })
        ));
    }

    #[test]
    fn test_stake_output_origin() {
        let mut applier = applier(0);
        let stake = Transaction::stake(
            vec![(&genesis_outpoint(&applier)).into()],
            vec![TransactionOutput::new("stake", 10_050)],
            1,
        );
        // Stake outputs may not exceed their inputs either
        let block = next_block(&applier, vec![stake]);
        assert!(!applier.apply_block(block).unwrap().is_applied());

        let stake = Transaction::stake(
            vec![(&genesis_outpoint(&applier)).into()],
            vec![TransactionOutput::new("stake", 10_000)],
            1,
        );
        let outpoint = stake.outpoint(0);
        let block = next_block(&applier, vec![stake, Transaction::coinbase("stake", 50, 1)]);
        assert!(applier.apply_block(block).unwrap().is_applied());
        assert_eq!(
            applier.ledger().lookup(&outpoint).unwrap().record.origin,
            OutputOrigin::StakeReward
        );
    }

    #[test]
    fn test_running_hash_matches_recomputation() {
        let mut applier = applier(0);
        let tx = TransactionBuilder::new()
            .add_input(&genesis_outpoint(&applier))
            .add_output("a", 6_000)
            .add_output("b", 3_000)
            .build();
        let block = next_block(&applier, vec![tx, Transaction::coinbase("m", 50, 1)]);
        applier.apply_block(block).unwrap();

        assert_eq!(
            *applier.utxo_hash(),
            SnapshotHash::from_ledger(applier.ledger(), applier.tip())
        );
        assert!(applier.verify_integrity().is_ok());
        assert_eq!(applier.snapshot().total_value(), 9_050);
    }

    #[test]
    fn test_corruption_halts_applier() {
        let mut applier = applier(0);
        mine_empty(&mut applier, 1);
        applier.ledger_mut().push_raw_spend(crate::core::ledger::SpendRecord {
            output: OutputId(0),
            spending_tx: "nonexistent".to_string(),
            height: 1,
        });

        assert!(matches!(
            applier.verify_integrity(),
            Err(LedgerError::Corrupted(_))
        ));
        assert!(applier.halted().is_some());

        let block = next_block(&applier, vec![]);
        assert!(matches!(
            applier.apply_block(block),
            Err(LedgerError::Halted(_))
        ));
    }
}
