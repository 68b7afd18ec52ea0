//! Ledger configuration

use crate::core::fee::FeePolicy;
use crate::core::maturity::{GenesisPolicy, MaturityPolicy};
use serde::{Deserialize, Serialize};

/// Consensus-adjacent knobs the ledger is started with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    #[serde(default)]
    pub maturity: MaturityPolicy,
    #[serde(default)]
    pub fee: FeePolicy,
}

impl LedgerConfig {
    pub fn with_maturity(mut self, window: u64) -> Self {
        self.maturity.window = window;
        self
    }

    pub fn with_genesis_policy(mut self, genesis: GenesisPolicy) -> Self {
        self.maturity.genesis = genesis;
        self
    }

    pub fn with_fee(mut self, fee: FeePolicy) -> Self {
        self.fee = fee;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::maturity::COINBASE_MATURITY;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.maturity.window, COINBASE_MATURITY);
        assert_eq!(config.maturity.genesis, GenesisPolicy::Matures);
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let config: LedgerConfig = serde_json::from_str(r#"{"maturity":{"window":5}}"#).unwrap();
        assert_eq!(config.maturity.window, 5);
        assert_eq!(config.fee, FeePolicy::default());
    }
}
