//! Ownership Index
//!
//! Maps each tracked script to the ledger outputs it controls. The index is a
//! fold over the ledger's block-ordered output stream: incremental updates and
//! rescans both go through [`OwnershipIndex::fold_output`], so an index built
//! block by block and one rebuilt from scratch are identical.
//!
//! Spent outputs are never removed here. The spend log in the ledger decides
//! whether an owned output still counts.

use crate::core::error::LedgerError;
use crate::core::ledger::{OutputId, OutputLedger, OutputRecord, OutputView};
use crate::core::transaction::OutPoint;
use crate::wallet::wallet::TrackedScripts;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipIndex {
    by_script: BTreeMap<String, BTreeSet<OutputId>>,
}

impl OwnershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` if its script is tracked. Returns whether it was added.
    pub fn fold_output(
        &mut self,
        id: OutputId,
        record: &OutputRecord,
        tracked: &TrackedScripts,
    ) -> bool {
        if !tracked.contains(record.script()) {
            return false;
        }
        self.by_script
            .entry(record.script().to_string())
            .or_default()
            .insert(id)
    }

    /// Note newly recorded outputs, in the order the ledger created them
    pub fn note_outputs(
        &mut self,
        ledger: &OutputLedger,
        ids: &[OutputId],
        tracked: &TrackedScripts,
    ) -> usize {
        ids.iter()
            .filter_map(|id| ledger.get(*id))
            .filter(|view| self.fold_output(view.id, view.record, tracked))
            .count()
    }

    /// Re-derive ownership for every output created within `from..=to`.
    ///
    /// Entries outside the range are kept. Returns the number of owned
    /// outputs found in the range.
    pub fn rescan(
        &mut self,
        ledger: &OutputLedger,
        tracked: &TrackedScripts,
        from: u64,
        to: u64,
    ) -> usize {
        let range = ledger.ids_in_range(from, to);

        for ids in self.by_script.values_mut() {
            ids.retain(|id| !range.contains(&id.0));
        }
        self.by_script.retain(|_, ids| !ids.is_empty());

        range
            .filter_map(|i| ledger.get(OutputId(i)))
            .filter(|view| self.fold_output(view.id, view.record, tracked))
            .count()
    }

    /// Drop everything and fold the whole ledger again
    pub fn rebuild(&mut self, ledger: &OutputLedger, tracked: &TrackedScripts) -> usize {
        self.by_script.clear();
        ledger
            .iter()
            .filter(|view| self.fold_output(view.id, view.record, tracked))
            .count()
    }

    /// Restore an index saved with [`OwnershipIndex::owned_outpoints`].
    ///
    /// Fails if an outpoint is missing from the ledger or its script is no
    /// longer tracked.
    pub fn from_outpoints(
        ledger: &OutputLedger,
        tracked: &TrackedScripts,
        outpoints: &[OutPoint],
    ) -> Result<Self, LedgerError> {
        let mut index = Self::new();
        for outpoint in outpoints {
            let view = ledger.lookup(outpoint)?;
            if !index.fold_output(view.id, view.record, tracked) {
                return Err(LedgerError::Corrupted(format!(
                    "owned output {} pays untracked script {}",
                    outpoint,
                    view.record.script()
                )));
            }
        }
        Ok(index)
    }

    /// Owned outputs by outpoint, in block order
    pub fn owned_outpoints(&self, ledger: &OutputLedger) -> Vec<OutPoint> {
        self.owned_ids()
            .into_iter()
            .filter_map(|id| ledger.get(id))
            .map(|view| view.record.outpoint.clone())
            .collect()
    }

    /// Every owned output id, ascending (block order)
    pub fn owned_ids(&self) -> BTreeSet<OutputId> {
        self.by_script.values().flatten().copied().collect()
    }

    /// Owned outputs that existed and were unspent as of `height`
    pub fn owned_unspent<'a>(
        &'a self,
        ledger: &'a OutputLedger,
        height: u64,
    ) -> impl Iterator<Item = OutputView<'a>> + 'a {
        self.by_script
            .values()
            .flatten()
            .filter_map(move |id| ledger.get(*id))
            .filter(move |view| view.is_unspent_at(height))
    }

    pub fn ids_for_script(&self, script: &str) -> Option<&BTreeSet<OutputId>> {
        self.by_script.get(script)
    }

    pub fn contains(&self, id: OutputId) -> bool {
        self.by_script.values().any(|ids| ids.contains(&id))
    }

    /// Number of owned outputs, spent or not
    pub fn len(&self) -> usize {
        self.by_script.values().map(|ids| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_script.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{OutPoint, TransactionOutput, TxKind};

    fn tracked(scripts: &[&str]) -> TrackedScripts {
        let mut tracked = TrackedScripts::new();
        for s in scripts {
            tracked.insert(s.to_string());
        }
        tracked
    }

    fn ledger() -> OutputLedger {
        let mut ledger = OutputLedger::new();
        ledger
            .record(
                "a",
                TxKind::Coinbase,
                &[TransactionOutput::new("mine", 100), TransactionOutput::new("other", 1)],
                0,
            )
            .unwrap();
        ledger
            .record("b", TxKind::Regular, &[TransactionOutput::new("mine", 5)], 1)
            .unwrap();
        ledger
            .record("c", TxKind::Regular, &[TransactionOutput::new("late", 7)], 2)
            .unwrap();
        ledger
    }

    #[test]
    fn test_incremental_equals_rebuild() {
        let ledger = ledger();
        let tracked = tracked(&["mine", "late"]);

        let mut incremental = OwnershipIndex::new();
        let all: Vec<OutputId> = ledger.iter().map(|v| v.id).collect();
        for chunk in all.chunks(2) {
            incremental.note_outputs(&ledger, chunk, &tracked);
        }

        let mut rebuilt = OwnershipIndex::new();
        assert_eq!(rebuilt.rebuild(&ledger, &tracked), 3);
        assert_eq!(incremental, rebuilt);
    }

    #[test]
    fn test_untracked_outputs_ignored() {
        let ledger = ledger();
        let mut index = OwnershipIndex::new();
        index.rebuild(&ledger, &tracked(&["mine"]));

        assert_eq!(index.len(), 2);
        assert!(index.ids_for_script("other").is_none());
        assert!(index.contains(OutputId(0)));
        assert!(!index.contains(OutputId(1)));
    }

    #[test]
    fn test_partial_rescan_picks_up_new_script() {
        let ledger = ledger();
        let mut index = OwnershipIndex::new();
        index.rebuild(&ledger, &tracked(&["mine"]));

        let found = index.rescan(&ledger, &tracked(&["mine", "late"]), 2, 2);
        assert_eq!(found, 1);
        assert_eq!(index.len(), 3);

        // Rescanning a range drops ownership that no longer applies there
        let found = index.rescan(&ledger, &tracked(&["late"]), 0, 1);
        assert_eq!(found, 0);
        assert_eq!(index.owned_ids().into_iter().collect::<Vec<_>>(), vec![OutputId(3)]);
    }

    #[test]
    fn test_rescan_idempotent() {
        let ledger = ledger();
        let tracked = tracked(&["mine"]);
        let mut index = OwnershipIndex::new();

        index.rescan(&ledger, &tracked, 0, 2);
        let first = index.clone();
        index.rescan(&ledger, &tracked, 0, 2);
        assert_eq!(index, first);
    }

    #[test]
    fn test_outpoints_restore_same_index() {
        let ledger = ledger();
        let mut index = OwnershipIndex::new();
        index.rescan(&ledger, &tracked(&["mine"]), 0, 1);

        // A script tracked later is not owned until a rescan covers it
        let wider = tracked(&["mine", "late"]);
        let saved = index.owned_outpoints(&ledger);
        assert_eq!(saved, vec![OutPoint::new("a", 0), OutPoint::new("b", 0)]);
        let restored = OwnershipIndex::from_outpoints(&ledger, &wider, &saved).unwrap();
        assert_eq!(restored, index);

        assert!(matches!(
            OwnershipIndex::from_outpoints(&ledger, &tracked(&["late"]), &saved),
            Err(LedgerError::Corrupted(_))
        ));
        assert!(matches!(
            OwnershipIndex::from_outpoints(&ledger, &wider, &[OutPoint::new("zz", 0)]),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_spent_outputs_stay_indexed() {
        let mut ledger = ledger();
        let tracked = tracked(&["mine"]);
        let mut index = OwnershipIndex::new();
        index.rebuild(&ledger, &tracked);

        ledger.note_transaction("d", 3);
        ledger.mark_spent(&OutPoint::new("b", 0), "d", 3).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.owned_unspent(&ledger, 2).count(), 2);
        assert_eq!(index.owned_unspent(&ledger, 3).count(), 1);
    }
}
