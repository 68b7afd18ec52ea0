//! Block implementation for the ledger
//!
//! A block is a connected, already-validated record handed over by the
//! consensus layer: a height, a hash and an ordered list of transactions.

use crate::core::transaction::Transaction;
use crate::crypto::double_sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Previous hash of the genesis block
pub fn null_hash() -> String {
    "0".repeat(64)
}

/// A block in the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    /// Block height (genesis is 0)
    pub height: u64,
    /// Block hash (cached)
    pub hash: String,
    /// Hash of the previous block
    pub previous_hash: String,
    /// Block creation timestamp
    pub timestamp: DateTime<Utc>,
    /// List of transactions in the block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block on top of `previous_hash`
    pub fn new(height: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        let mut block = Self {
            height,
            hash: String::new(),
            previous_hash,
            timestamp: Utc::now(),
            transactions,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Create the genesis block paying the given allocations
    pub fn genesis(allocations: &[(String, u64)]) -> Self {
        let transactions = if allocations.is_empty() {
            Vec::new()
        } else {
            vec![Transaction::allocation(allocations, 0)]
        };
        Self::new(0, null_hash(), transactions)
    }

    /// Calculate the hash over the header fields and every transaction id
    pub fn calculate_hash(&self) -> String {
        let tx_ids: Vec<&str> = self.transactions.iter().map(|tx| tx.id.as_str()).collect();
        let data = format!(
            "{}{}{}{}",
            self.height,
            self.previous_hash,
            self.timestamp.timestamp(),
            tx_ids.join("")
        );
        double_sha256_hex(data.as_bytes())
    }

    /// Verify the block hash and every transaction id
    pub fn verify_hash(&self) -> bool {
        self.hash == self.calculate_hash() && self.transactions.iter().all(|tx| tx.verify_id())
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
