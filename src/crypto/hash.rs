//! Cryptographic hashing utilities for the ledger
//!
//! Provides SHA-256 based hashing functions used for block hashes,
//! transaction IDs, snapshot hashes and script derivation.

use sha2::{Digest, Sha256};

/// Prefix for scripts derived by a wallet
pub const SCRIPT_PREFIX: &str = "ws1";

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
/// Used for block hashes
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes double SHA-256 hash and returns it as a hex string
pub fn double_sha256_hex(data: &[u8]) -> String {
    hex::encode(double_sha256(data))
}

/// Derive the `counter`-th script of a wallet seed.
///
/// Key derivation lives outside the ledger; this only needs to be
/// deterministic and collision-free for a given seed.
pub fn derive_script(seed: &str, counter: u32) -> String {
    let hex = sha256_hex(format!("{}/{}", seed, counter).as_bytes());
    format!("{}{}", SCRIPT_PREFIX, &hex[..40])
}
