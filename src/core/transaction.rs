//! Transaction handling for the ledger
//!
//! Implements a UTXO-based transaction model. Transactions arrive unsigned:
//! signature and proof-of-stake checks belong to the consensus layer that
//! hands us connected blocks.

use crate::crypto::sha256_hex;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Approximate serialized size of a transaction without inputs or outputs
pub const TX_BASE_SIZE: usize = 10;

/// Approximate serialized size of one input
pub const TX_INPUT_SIZE: usize = 150;

/// Approximate serialized size of one output
pub const TX_OUTPUT_SIZE: usize = 34;

// =============================================================================
// Outpoint
// =============================================================================

/// Reference to a single output of a prior transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Transaction ID of the creating transaction
    pub tx_id: String,
    /// Index of the output in the creating transaction
    pub output_index: u32,
}

impl OutPoint {
    pub fn new(tx_id: impl Into<String>, output_index: u32) -> Self {
        Self {
            tx_id: tx_id.into(),
            output_index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.output_index)
    }
}

// =============================================================================
// Transaction Input / Output
// =============================================================================

/// Transaction input (reference to previous output)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionInput {
    /// Transaction ID of the previous transaction
    pub tx_id: String,
    /// Index of the output in the previous transaction
    pub output_index: u32,
}

impl TransactionInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_id.clone(), self.output_index)
    }
}

impl From<&OutPoint> for TransactionInput {
    fn from(outpoint: &OutPoint) -> Self {
        Self {
            tx_id: outpoint.tx_id.clone(),
            output_index: outpoint.output_index,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Amount in the smallest unit
    pub amount: u64,
    /// Script that controls the output
    pub script: String,
}

impl TransactionOutput {
    pub fn new(script: impl Into<String>, amount: u64) -> Self {
        Self {
            amount,
            script: script.into(),
        }
    }
}

// =============================================================================
// Kinds
// =============================================================================

/// What produced a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TxKind {
    #[default]
    Regular,
    /// Block reward, including genesis allocations
    Coinbase,
    /// Proof-of-stake reward
    Stake,
}

/// Origin of an output, derived from the kind of its transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputOrigin {
    Ordinary,
    Coinbase,
    StakeReward,
}

impl OutputOrigin {
    /// Whether the output is a reward subject to the maturity window
    pub fn is_reward(&self) -> bool {
        !matches!(self, OutputOrigin::Ordinary)
    }
}

impl From<TxKind> for OutputOrigin {
    fn from(kind: TxKind) -> Self {
        match kind {
            TxKind::Regular => OutputOrigin::Ordinary,
            TxKind::Coinbase => OutputOrigin::Coinbase,
            TxKind::Stake => OutputOrigin::StakeReward,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Unique transaction ID (hash of transaction data)
    pub id: String,
    #[serde(default)]
    pub kind: TxKind,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    /// Height the transaction was built at (block height for rewards)
    #[serde(default)]
    pub lock_height: u64,
}

impl Transaction {
    /// Create a new regular transaction
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        Self::with_kind(TxKind::Regular, inputs, outputs, 0)
    }

    pub fn with_kind(
        kind: TxKind,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_height: u64,
    ) -> Self {
        let mut tx = Self {
            id: String::new(),
            kind,
            inputs,
            outputs,
            lock_height,
        };
        tx.id = tx.calculate_hash();
        tx
    }

    /// Create a coinbase (block reward) transaction
    pub fn coinbase(script: &str, amount: u64, block_height: u64) -> Self {
        Self::with_kind(
            TxKind::Coinbase,
            Vec::new(),
            vec![TransactionOutput::new(script, amount)],
            block_height,
        )
    }

    /// Create a coinbase paying several scripts at once (genesis allocations)
    pub fn allocation(allocations: &[(String, u64)], block_height: u64) -> Self {
        let outputs = allocations
            .iter()
            .map(|(script, amount)| TransactionOutput::new(script.as_str(), *amount))
            .collect();
        Self::with_kind(TxKind::Coinbase, Vec::new(), outputs, block_height)
    }

    /// Create a stake transaction spending `inputs` and paying the reward outputs
    pub fn stake(
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        block_height: u64,
    ) -> Self {
        Self::with_kind(TxKind::Stake, inputs, outputs, block_height)
    }

    pub fn is_coinbase(&self) -> bool {
        self.kind == TxKind::Coinbase
    }

    /// Calculate the transaction hash
    pub fn calculate_hash(&self) -> String {
        let data = format!(
            "{:?}{:?}{:?}{}",
            self.kind, self.inputs, self.outputs, self.lock_height
        );
        sha256_hex(data.as_bytes())
    }

    /// Verify the cached id matches the body
    pub fn verify_id(&self) -> bool {
        self.id == self.calculate_hash()
    }

    /// Get total output amount
    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).fold(0, u64::saturating_add)
    }

    /// Outpoint of the `index`-th output
    pub fn outpoint(&self, index: u32) -> OutPoint {
        OutPoint::new(self.id.clone(), index)
    }

    /// Approximate serialized size in bytes
    pub fn estimated_size(&self) -> usize {
        estimated_size(self.inputs.len(), self.outputs.len())
    }
}

/// Approximate serialized size of a transaction with the given shape
pub fn estimated_size(inputs: usize, outputs: usize) -> usize {
    TX_BASE_SIZE + inputs * TX_INPUT_SIZE + outputs * TX_OUTPUT_SIZE
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for assembling unsigned transactions
pub struct TransactionBuilder {
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
    lock_height: u64,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_height: 0,
        }
    }

    /// Add an input spending `outpoint`
    pub fn add_input(mut self, outpoint: &OutPoint) -> Self {
        self.inputs.push(TransactionInput::from(outpoint));
        self
    }

    /// Add an output
    pub fn add_output(mut self, script: &str, amount: u64) -> Self {
        self.outputs.push(TransactionOutput::new(script, amount));
        self
    }

    /// Set the height the transaction is built at
    pub fn lock_height(mut self, lock_height: u64) -> Self {
        self.lock_height = lock_height;
        self
    }

    /// Build without signing
    pub fn build(self) -> Transaction {
        Transaction::with_kind(TxKind::Regular, self.inputs, self.outputs, self.lock_height)
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
