//! Fee policy
//!
//! Fees are paid implicitly: whatever a transaction's inputs carry beyond its
//! outputs is the fee. The wallet picks how much to leave behind.

use crate::core::transaction::estimated_size;
use serde::{Deserialize, Serialize};

/// Default flat fee in the smallest unit
pub const DEFAULT_FLAT_FEE: u64 = 1;

/// Fee rate in units per estimated byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(pub u64);

impl FeeRate {
    /// Calculate fee for a given size
    pub fn fee_for_size(&self, size_bytes: usize) -> u64 {
        self.0.saturating_mul(size_bytes as u64)
    }
}

/// How the wallet prices its own transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePolicy {
    Flat(u64),
    PerByte(FeeRate),
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy::Flat(DEFAULT_FLAT_FEE)
    }
}

impl FeePolicy {
    /// Fee for a transaction with the given number of inputs and outputs
    pub fn fee_for(&self, inputs: usize, outputs: usize) -> u64 {
        match self {
            FeePolicy::Flat(fee) => *fee,
            FeePolicy::PerByte(rate) => rate.fee_for_size(estimated_size(inputs, outputs)),
        }
    }
}
