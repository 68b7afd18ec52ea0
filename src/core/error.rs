//! Ledger error taxonomy

use crate::core::transaction::OutPoint;
use thiserror::Error;

/// Ledger-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Duplicate output: {0}")]
    DuplicateOutput(OutPoint),
    #[error("Unknown output: {0}")]
    UnknownOutput(OutPoint),
    #[error("Output not found: {0}")]
    NotFound(OutPoint),
    #[error("Double spend of {outpoint}: already spent by {spent_by} at height {height}")]
    DoubleSpend {
        outpoint: OutPoint,
        spent_by: String,
        height: u64,
    },
    #[error("Invalid height: {height} (reference height {reference})")]
    InvalidHeight { height: u64, reference: u64 },
    #[error("Invalid spend in tx {tx_id}: {reason}")]
    InvalidSpend { tx_id: String, reason: String },
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Invalid range: {from}..={to} (tip {tip})")]
    InvalidRange { from: u64, to: u64, tip: u64 },
    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),
    #[error("Unexpected parent: expected {expected}, got {got}")]
    UnexpectedParent { expected: String, got: String },
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Ledger corrupted: {0}")]
    Corrupted(String),
    #[error("Block application halted: {0}")]
    Halted(String),
}

impl LedgerError {
    /// Errors that mean the ledger can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Corrupted(_) | LedgerError::Halted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(LedgerError::Corrupted("x".into()).is_fatal());
        assert!(LedgerError::Halted("x".into()).is_fatal());
        assert!(!LedgerError::InvalidAmount(0).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::UnknownOutput(OutPoint::new("abc", 1));
        assert_eq!(err.to_string(), "Unknown output: abc:1");
    }
}
