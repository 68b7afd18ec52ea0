//! UTXO Ledger: output ledger, maturity rules and wallet ownership tracking
//!
//! This crate provides:
//! - An append-only Output Ledger with a spend log
//! - Coinbase and stake maturity rules
//! - Atomic block application with a running UTXO snapshot hash
//! - Wallet ownership index with incremental updates and rescans
//! - Height-aware balances and coin selection for spends
//! - JSON persistence that replays the chain on load
//!
//! # Example
//!
//! ```rust
//! use utxo_ledger::core::LedgerConfig;
//! use utxo_ledger::node::Node;
//! use utxo_ledger::wallet::Wallet;
//!
//! let config = LedgerConfig::default().with_maturity(1);
//! let mut node = Node::with_stake(config, Wallet::new("doc"), 1_000).unwrap();
//!
//! // Let the genesis stake mature
//! node.generate(1, None).unwrap();
//! assert_eq!(node.get_balance(None).unwrap(), 1_000);
//!
//! let spend = node.build_spend("recipient", 400).unwrap();
//! node.mine_block(vec![spend.transaction]).unwrap();
//! assert_eq!(node.get_balance(None).unwrap(), 599);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod node;
pub mod service;
pub mod snapshot;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use core::{
    ApplyOutcome, Block, BlockApplier, LedgerConfig, LedgerError, MaturityPolicy, OutPoint,
    OutputLedger, Transaction,
};
pub use node::Node;
pub use service::LedgerService;
pub use snapshot::{Snapshot, SnapshotHash};
pub use storage::{Storage, StorageConfig, StorageError};
pub use wallet::{OwnershipIndex, Wallet};
