//! Static fallback fee table
//!
//! Used when a simulation says "direct operation" and nothing better is
//! known. Values are in the chain's native gas token.

use crate::config::FeeConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fee used for operation/chain pairs missing from the table
pub const DEFAULT_FALLBACK_FEE: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub gas_supplied: f64,
    pub total: f64,
}

impl FeeEstimate {
    pub fn new(gas_supplied: f64, total: f64) -> Self {
        Self {
            gas_supplied,
            total,
        }
    }

    pub fn flat(fee: f64) -> Self {
        Self::new(fee, fee)
    }
}

// (operation, chain id, gas supplied, total)
const BUILTIN: &[(&str, u64, f64, f64)] = &[
    // Ethereum
    ("transfer", 1, 0.0015, 0.002),
    ("swap", 1, 0.004, 0.006),
    ("bridge", 1, 0.003, 0.005),
    ("stake", 1, 0.003, 0.004),
    // Optimism
    ("transfer", 10, 0.00005, 0.0001),
    ("swap", 10, 0.0002, 0.0003),
    ("bridge", 10, 0.0002, 0.0004),
    ("stake", 10, 0.00015, 0.0002),
    // Polygon
    ("transfer", 137, 0.01, 0.02),
    ("swap", 137, 0.03, 0.05),
    ("bridge", 137, 0.03, 0.05),
    ("stake", 137, 0.02, 0.03),
    // Base
    ("transfer", 8453, 0.00003, 0.00005),
    ("swap", 8453, 0.0001, 0.0002),
    ("bridge", 8453, 0.0001, 0.0002),
    ("stake", 8453, 0.0001, 0.00015),
    // Arbitrum
    ("transfer", 42161, 0.0001, 0.00015),
    ("swap", 42161, 0.0003, 0.0005),
    ("bridge", 42161, 0.0003, 0.0005),
    ("stake", 42161, 0.0002, 0.0003),
];

/// Per-operation, per-chain fallback fee lookup
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    table: HashMap<(String, u64), FeeEstimate>,
    default: FeeEstimate,
}

impl FeeEstimator {
    /// Estimator with the built-in table only
    pub fn new() -> Self {
        let table = BUILTIN
            .iter()
            .map(|(op, chain, gas, total)| ((op.to_string(), *chain), FeeEstimate::new(*gas, *total)))
            .collect();

        Self {
            table,
            default: FeeEstimate::flat(DEFAULT_FALLBACK_FEE),
        }
    }

    /// Built-in table plus configured overrides
    pub fn from_config(config: &FeeConfig) -> Self {
        let mut estimator = Self::new();
        estimator.default = FeeEstimate::flat(config.default_fee);

        for entry in &config.overrides {
            estimator.table.insert(
                (entry.operation.to_ascii_lowercase(), entry.chain_id),
                FeeEstimate::new(entry.gas_supplied, entry.total),
            );
        }

        estimator
    }

    /// Fallback fee for `operation` on `chain_id`
    pub fn estimate(&self, operation: &str, chain_id: u64) -> FeeEstimate {
        self.table
            .get(&(operation.to_ascii_lowercase(), chain_id))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_estimate(&self) -> FeeEstimate {
        self.default
    }
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new()
    }
}
