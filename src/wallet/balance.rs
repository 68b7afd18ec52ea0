//! Balance Aggregator
//!
//! Walks the wallet's owned outputs only, never the whole ledger.

use crate::core::error::LedgerError;
use crate::core::ledger::OutputLedger;
use crate::core::maturity::MaturityPolicy;
use crate::wallet::ownership::OwnershipIndex;
use serde::{Deserialize, Serialize};

/// Owned value split by what can be done with it at some height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    pub height: u64,
    /// Mature and unspent
    pub spendable: u64,
    /// Unspent but still inside the maturity window (or frozen)
    pub immature: u64,
    /// Already spent as of `height`
    pub spent: u64,
}

/// Spendable balance at `height`
pub fn balance(
    ledger: &OutputLedger,
    index: &OwnershipIndex,
    policy: &MaturityPolicy,
    height: u64,
) -> Result<u64, LedgerError> {
    Ok(breakdown(ledger, index, policy, height)?.spendable)
}

/// Full breakdown of owned value at `height`.
///
/// Outputs created after `height` are ignored; heights beyond the tip
/// project maturity of the outputs known so far.
pub fn breakdown(
    ledger: &OutputLedger,
    index: &OwnershipIndex,
    policy: &MaturityPolicy,
    height: u64,
) -> Result<BalanceBreakdown, LedgerError> {
    let mut result = BalanceBreakdown {
        height,
        ..Default::default()
    };

    for id in index.owned_ids() {
        let view = ledger.get(id).ok_or_else(|| {
            LedgerError::Corrupted(format!("owned output #{} missing from ledger", id.0))
        })?;
        let record = view.record;
        if record.height > height {
            continue;
        }

        let bucket = if !view.is_unspent_at(height) {
            &mut result.spent
        } else if policy.is_spendable(record, height)? {
            &mut result.spendable
        } else {
            &mut result.immature
        };
        *bucket = bucket.saturating_add(record.amount());
    }

    Ok(result)
}
