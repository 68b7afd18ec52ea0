//! Maturity Policy
//!
//! Decides whether an output may be spent at a given height. Ordinary
//! outputs are spendable as soon as they exist; coinbase and stake rewards
//! need `window` confirming blocks first.

use crate::core::error::LedgerError;
use crate::core::ledger::OutputRecord;
use serde::{Deserialize, Serialize};

/// Number of blocks a reward output must wait before it can be spent
pub const COINBASE_MATURITY: u64 = 100;

/// How genesis allocations are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GenesisPolicy {
    /// Genesis outputs mature like any other reward
    #[default]
    Matures,
    /// Genesis outputs can never be spent
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityPolicy {
    pub window: u64,
    #[serde(default)]
    pub genesis: GenesisPolicy,
}

impl Default for MaturityPolicy {
    fn default() -> Self {
        Self {
            window: COINBASE_MATURITY,
            genesis: GenesisPolicy::default(),
        }
    }
}

impl MaturityPolicy {
    pub fn new(window: u64, genesis: GenesisPolicy) -> Self {
        Self { window, genesis }
    }

    /// Whether `output` can be spent when the chain is at `current_height`
    pub fn is_spendable(
        &self,
        output: &OutputRecord,
        current_height: u64,
    ) -> Result<bool, LedgerError> {
        let age = current_height
            .checked_sub(output.height)
            .ok_or(LedgerError::InvalidHeight {
                height: current_height,
                reference: output.height,
            })?;

        if output.height == 0 && self.genesis == GenesisPolicy::Frozen {
            return Ok(false);
        }
        if !output.origin.is_reward() {
            return Ok(true);
        }
        Ok(age >= self.window)
    }

    /// Blocks left before `output` becomes spendable, `None` if it never will
    pub fn blocks_until_spendable(&self, output: &OutputRecord, current_height: u64) -> Option<u64> {
        if output.height == 0 && self.genesis == GenesisPolicy::Frozen {
            return None;
        }
        if !output.origin.is_reward() {
            return Some(output.height.saturating_sub(current_height));
        }
        Some((output.height + self.window).saturating_sub(current_height))
    }
}
