//! Output Ledger
//!
//! Append-only record of every output ever created. Outputs live in an arena
//! indexed by [`OutputId`]; spending an output appends a [`SpendRecord`] to a
//! separate log instead of touching the output itself, so the full history
//! stays queryable after the fact.

use crate::core::error::LedgerError;
use crate::core::transaction::{OutPoint, OutputOrigin, TransactionOutput, TxKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

// =============================================================================
// Records
// =============================================================================

/// Position of an output in the ledger arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId(pub usize);

/// An output as it was created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub outpoint: OutPoint,
    pub output: TransactionOutput,
    pub origin: OutputOrigin,
    /// Height of the block that created the output
    pub height: u64,
}

impl OutputRecord {
    pub fn amount(&self) -> u64 {
        self.output.amount
    }

    pub fn script(&self) -> &str {
        &self.output.script
    }
}

/// The one-time transition of an output from unspent to spent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRecord {
    pub output: OutputId,
    pub spending_tx: String,
    pub height: u64,
}

/// Current state of an output: its creation record plus its spend, if any
#[derive(Debug, Clone, Copy)]
pub struct OutputView<'a> {
    pub id: OutputId,
    pub record: &'a OutputRecord,
    pub spend: Option<&'a SpendRecord>,
}

impl OutputView<'_> {
    pub fn is_spent(&self) -> bool {
        self.spend.is_some()
    }

    /// Whether the output existed and was unspent as of `height`
    pub fn is_unspent_at(&self, height: u64) -> bool {
        self.record.height <= height && self.spend.map_or(true, |s| s.height > height)
    }
}

// =============================================================================
// Output Ledger
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct OutputLedger {
    /// Arena of outputs in creation order (non-decreasing height)
    outputs: Vec<OutputRecord>,
    by_outpoint: HashMap<OutPoint, OutputId>,
    /// Append-only spend log
    spends: Vec<SpendRecord>,
    /// Output -> position in the spend log
    spent_by: HashMap<OutputId, usize>,
    /// Every recorded transaction id and the height it was applied at
    transactions: HashMap<String, u64>,
}

impl OutputLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the outputs of `tx_id` at `height`.
    ///
    /// Nothing is written unless every output is new.
    pub fn record(
        &mut self,
        tx_id: &str,
        kind: TxKind,
        outputs: &[TransactionOutput],
        height: u64,
    ) -> Result<Vec<OutputId>, LedgerError> {
        if let Some(last) = self.outputs.last() {
            if height < last.height {
                return Err(LedgerError::InvalidHeight {
                    height,
                    reference: last.height,
                });
            }
        }

        for index in 0..outputs.len() {
            let outpoint = OutPoint::new(tx_id, index as u32);
            if self.by_outpoint.contains_key(&outpoint) {
                return Err(LedgerError::DuplicateOutput(outpoint));
            }
        }

        let origin = OutputOrigin::from(kind);
        let mut ids = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.iter().enumerate() {
            let id = OutputId(self.outputs.len());
            let outpoint = OutPoint::new(tx_id, index as u32);
            self.by_outpoint.insert(outpoint.clone(), id);
            self.outputs.push(OutputRecord {
                outpoint,
                output: output.clone(),
                origin,
                height,
            });
            ids.push(id);
        }
        self.transactions.entry(tx_id.to_string()).or_insert(height);

        Ok(ids)
    }

    /// Mark an output as spent by `spending_tx` at `height`
    pub fn mark_spent(
        &mut self,
        outpoint: &OutPoint,
        spending_tx: &str,
        height: u64,
    ) -> Result<OutputId, LedgerError> {
        let id = *self
            .by_outpoint
            .get(outpoint)
            .ok_or_else(|| LedgerError::UnknownOutput(outpoint.clone()))?;

        if let Some(&position) = self.spent_by.get(&id) {
            let existing = &self.spends[position];
            if existing.spending_tx == spending_tx {
                return Ok(id);
            }
            return Err(LedgerError::DoubleSpend {
                outpoint: outpoint.clone(),
                spent_by: existing.spending_tx.clone(),
                height: existing.height,
            });
        }

        let created = self.outputs[id.0].height;
        if height < created {
            return Err(LedgerError::InvalidHeight {
                height,
                reference: created,
            });
        }

        self.spent_by.insert(id, self.spends.len());
        self.spends.push(SpendRecord {
            output: id,
            spending_tx: spending_tx.to_string(),
            height,
        });
        Ok(id)
    }

    /// Remember a transaction that created no outputs
    pub fn note_transaction(&mut self, tx_id: &str, height: u64) {
        self.transactions.entry(tx_id.to_string()).or_insert(height);
    }

    /// Look up an output's current state
    pub fn lookup(&self, outpoint: &OutPoint) -> Result<OutputView<'_>, LedgerError> {
        self.by_outpoint
            .get(outpoint)
            .and_then(|id| self.get(*id))
            .ok_or_else(|| LedgerError::NotFound(outpoint.clone()))
    }

    pub fn get(&self, id: OutputId) -> Option<OutputView<'_>> {
        self.outputs.get(id.0).map(|record| OutputView {
            id,
            record,
            spend: self.spent_by.get(&id).map(|&p| &self.spends[p]),
        })
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.by_outpoint.contains_key(outpoint)
    }

    /// All outputs in block order
    pub fn iter(&self) -> impl Iterator<Item = OutputView<'_>> + '_ {
        (0..self.outputs.len()).filter_map(move |i| self.get(OutputId(i)))
    }

    /// Arena positions of the outputs created within `from..=to`
    pub fn ids_in_range(&self, from: u64, to: u64) -> Range<usize> {
        let start = self.outputs.partition_point(|o| o.height < from);
        let end = self.outputs.partition_point(|o| o.height <= to);
        start..end.max(start)
    }

    /// Outputs that existed and were unspent as of `height`
    pub fn unspent_at(&self, height: u64) -> impl Iterator<Item = OutputView<'_>> + '_ {
        self.iter().filter(move |view| view.is_unspent_at(height))
    }

    pub fn transaction_height(&self, tx_id: &str) -> Option<u64> {
        self.transactions.get(tx_id).copied()
    }

    /// The spend log in append order
    pub fn spends(&self) -> &[SpendRecord] {
        &self.spends
    }

    /// Check that every spend record names a transaction the ledger knows,
    /// applied at the height the spend claims.
    pub fn verify_integrity(&self) -> Result<(), LedgerError> {
        for spend in &self.spends {
            let record = self.outputs.get(spend.output.0).ok_or_else(|| {
                LedgerError::Corrupted(format!("spend of unknown output #{}", spend.output.0))
            })?;

            match self.transactions.get(&spend.spending_tx) {
                None => {
                    return Err(LedgerError::Corrupted(format!(
                        "{} spent by nonexistent transaction {}",
                        record.outpoint, spend.spending_tx
                    )))
                }
                Some(&height) if height != spend.height => {
                    return Err(LedgerError::Corrupted(format!(
                        "{} spent at height {} but {} was applied at {}",
                        record.outpoint, spend.height, spend.spending_tx, height
                    )))
                }
                Some(_) => {}
            }

            if spend.height < record.height {
                return Err(LedgerError::Corrupted(format!(
                    "{} spent at height {} before its creation at {}",
                    record.outpoint, spend.height, record.height
                )));
            }
        }

        if self.spent_by.len() != self.spends.len() {
            return Err(LedgerError::Corrupted(
                "spend index out of sync with spend log".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of outputs ever created
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn spent_count(&self) -> usize {
        self.spends.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    #[cfg(test)]
    pub(crate) fn push_raw_spend(&mut self, spend: SpendRecord) {
        self.spent_by.insert(spend.output, self.spends.len());
        self.spends.push(spend);
    }
}

// =============================================================================
// Tests
// =============================================================================
