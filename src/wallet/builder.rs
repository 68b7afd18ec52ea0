//! Transaction Builder
//!
//! Funds a payment from the wallet's mature, unspent outputs. Selection is
//! oldest first (creation height, then outpoint) so which coins get picked is
//! predictable around maturity boundaries.

use crate::core::error::LedgerError;
use crate::core::fee::FeePolicy;
use crate::core::ledger::{OutputLedger, OutputView};
use crate::core::maturity::MaturityPolicy;
use crate::core::transaction::{OutPoint, Transaction, TransactionBuilder};
use crate::wallet::ownership::OwnershipIndex;
use log::debug;

/// Everything coin selection reads
#[derive(Debug, Clone, Copy)]
pub struct SpendContext<'a> {
    pub ledger: &'a OutputLedger,
    pub index: &'a OwnershipIndex,
    pub policy: &'a MaturityPolicy,
    pub fee: &'a FeePolicy,
    /// Height the spend is built at
    pub height: u64,
}

/// An unsigned spend ready to hand to the network layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedSpend {
    pub transaction: Transaction,
    pub selected: Vec<OutPoint>,
    pub fee: u64,
    pub change: u64,
}

/// Owned outputs spendable at `ctx.height`, oldest first
pub fn spendable_outputs<'a>(ctx: &SpendContext<'a>) -> Result<Vec<OutputView<'a>>, LedgerError> {
    let mut candidates = Vec::new();
    for view in ctx.index.owned_unspent(ctx.ledger, ctx.height) {
        if ctx.policy.is_spendable(view.record, ctx.height)? {
            candidates.push(view);
        }
    }
    candidates.sort_by(|a, b| {
        (a.record.height, &a.record.outpoint).cmp(&(b.record.height, &b.record.outpoint))
    });
    Ok(candidates)
}

/// Build a transaction paying `amount` to `destination`, with any
/// remainder going to `change_script`.
///
/// Inputs are priced for a payment plus change. When the wallet can only
/// cover the payment alone, the remainder goes to the fee and no change
/// output is made.
pub fn build_spend(
    ctx: &SpendContext<'_>,
    destination: &str,
    change_script: &str,
    amount: u64,
) -> Result<UnsignedSpend, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }

    let candidates = spendable_outputs(ctx)?;
    let available = candidates
        .iter()
        .map(|v| v.record.amount())
        .fold(0, u64::saturating_add);

    let mut selected = Vec::new();
    let mut total: u64 = 0;
    let mut need = amount.saturating_add(ctx.fee.fee_for(1, 2));
    // First prefix that pays `amount` with a single output: (inputs, total)
    let mut without_change = None;

    for view in candidates {
        selected.push(view.record.outpoint.clone());
        total = total.saturating_add(view.record.amount());
        need = amount.saturating_add(ctx.fee.fee_for(selected.len(), 2));
        if total >= need {
            break;
        }
        if without_change.is_none()
            && total >= amount.saturating_add(ctx.fee.fee_for(selected.len(), 1))
        {
            without_change = Some((selected.len(), total));
        }
    }

    let (fee, change) = if total >= need {
        (need - amount, total - need)
    } else if let Some((inputs, funded)) = without_change {
        selected.truncate(inputs);
        (funded - amount, 0)
    } else {
        return Err(LedgerError::InsufficientFunds {
            have: available,
            need,
        });
    };

    let mut builder = TransactionBuilder::new().lock_height(ctx.height);
    for outpoint in &selected {
        builder = builder.add_input(outpoint);
    }
    builder = builder.add_output(destination, amount);
    if change > 0 {
        builder = builder.add_output(change_script, change);
    }
    let transaction = builder.build();

    debug!(
        "Built spend {} of {} with {} inputs (fee {}, change {})",
        transaction.id,
        amount,
        selected.len(),
        fee,
        change
    );

    Ok(UnsignedSpend {
        transaction,
        selected,
        fee,
        change,
    })
}
