//! Command-line host for the ledger

pub mod commands;

pub use commands::*;
