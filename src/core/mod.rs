//! Core ledger components
//!
//! This module contains the chain-side state machine:
//! - Transactions and blocks (the validated block stream)
//! - Output Ledger (every output ever created, plus the spend log)
//! - Maturity policy for coinbase and stake rewards
//! - Block Applier (atomic validate-then-commit)
//! - Fee policy and configuration

pub mod applier;
pub mod block;
pub mod config;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod maturity;
pub mod transaction;

pub use applier::{ApplyOutcome, ApplyState, BlockApplier, ChainStats};
pub use block::{null_hash, Block};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use fee::{FeePolicy, FeeRate, DEFAULT_FLAT_FEE};
pub use ledger::{OutputId, OutputLedger, OutputRecord, OutputView, SpendRecord};
pub use maturity::{GenesisPolicy, MaturityPolicy, COINBASE_MATURITY};
pub use transaction::{
    OutPoint, OutputOrigin, Transaction, TransactionBuilder, TransactionInput, TransactionOutput,
    TxKind,
};
