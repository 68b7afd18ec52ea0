//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing for transaction ids and block hashes
//! - Deterministic script derivation for wallets

pub mod hash;

pub use hash::{derive_script, double_sha256, double_sha256_hex, sha256, sha256_hex};
