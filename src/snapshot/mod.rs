//! UTXO snapshots
//!
//! A snapshot is the unspent output set at some height, grouped per
//! transaction, plus an order-independent hash of that set. The hash is a
//! multiset hash: adding and subtracting the same output cancels out, so the
//! Block Applier can keep it current while blocks arrive and a full
//! recomputation from the ledger must land on the same value.

use crate::core::ledger::{OutputLedger, OutputRecord};
use crate::core::transaction::{OutputOrigin, TransactionOutput};
use crate::crypto::{sha256, sha256_hex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const LANES: usize = 4;

/// Unspent outputs of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSubset {
    pub tx_id: String,
    /// Height the transaction was included at
    pub height: u64,
    pub origin: OutputOrigin,
    /// Keyed by output index
    pub outputs: BTreeMap<u32, TransactionOutput>,
}

/// Running multiset hash over a UTXO set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotHash {
    lanes: [u64; LANES],
}

impl SnapshotHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash of every output unspent at `height`
    pub fn from_ledger(ledger: &OutputLedger, height: u64) -> Self {
        let mut hash = Self::new();
        for view in ledger.unspent_at(height) {
            hash.add_utxo(view.record);
        }
        hash
    }

    pub fn add_utxo(&mut self, record: &OutputRecord) {
        for (lane, value) in self.lanes.iter_mut().zip(Self::utxo_lanes(record)) {
            *lane = lane.wrapping_add(value);
        }
    }

    pub fn subtract_utxo(&mut self, record: &OutputRecord) {
        for (lane, value) in self.lanes.iter_mut().zip(Self::utxo_lanes(record)) {
            *lane = lane.wrapping_sub(value);
        }
    }

    /// Hex digest of the current set
    pub fn digest(&self) -> String {
        let bytes: Vec<u8> = self.lanes.iter().flat_map(|l| l.to_le_bytes()).collect();
        hex::encode(bytes)
    }

    fn utxo_lanes(record: &OutputRecord) -> [u64; LANES] {
        let data = format!(
            "{}:{}:{:?}:{}:{}",
            record.outpoint,
            record.height,
            record.origin,
            record.output.amount,
            record.output.script
        );
        let digest = sha256(data.as_bytes());
        let mut lanes = [0u64; LANES];
        for (lane, chunk) in lanes.iter_mut().zip(digest.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *lane = u64::from_le_bytes(buf);
        }
        lanes
    }
}

/// Header describing a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub snapshot_hash: String,
    pub block_hash: String,
    pub height: u64,
    pub total_utxo_subsets: u64,
}

impl SnapshotHeader {
    pub fn new(hash: &SnapshotHash, block_hash: &str, height: u64, total_utxo_subsets: u64) -> Self {
        let snapshot_hash = sha256_hex(format!("{}{}", hash.digest(), block_hash).as_bytes());
        Self {
            snapshot_hash,
            block_hash: block_hash.to_string(),
            height,
            total_utxo_subsets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    pub utxo_subsets: Vec<UtxoSubset>,
}

impl Snapshot {
    /// Capture the unspent set as of `height`, computed from scratch
    pub fn capture(ledger: &OutputLedger, height: u64, block_hash: &str) -> Self {
        let mut subsets: Vec<UtxoSubset> = Vec::new();
        let mut hash = SnapshotHash::new();

        for view in ledger.unspent_at(height) {
            let record = view.record;
            hash.add_utxo(record);

            // Outputs of one transaction sit next to each other in the arena
            match subsets.last_mut() {
                Some(subset) if subset.tx_id == record.outpoint.tx_id => {
                    subset
                        .outputs
                        .insert(record.outpoint.output_index, record.output.clone());
                }
                _ => {
                    let mut outputs = BTreeMap::new();
                    outputs.insert(record.outpoint.output_index, record.output.clone());
                    subsets.push(UtxoSubset {
                        tx_id: record.outpoint.tx_id.clone(),
                        height: record.height,
                        origin: record.origin,
                        outputs,
                    });
                }
            }
        }

        let header = SnapshotHeader::new(&hash, block_hash, height, subsets.len() as u64);
        Self {
            header,
            utxo_subsets: subsets,
        }
    }

    /// Total value held by the snapshot
    pub fn total_value(&self) -> u64 {
        self.utxo_subsets
            .iter()
            .flat_map(|s| s.outputs.values())
            .map(|o| o.amount)
            .fold(0, u64::saturating_add)
    }
}
