//! Route simulation
//!
//! Turns whatever the SDK's route simulation does (returns a route, returns
//! nothing, fails) into one of three [`SimulationOutcome`] states. Callers
//! render those states directly, so nothing in here returns an error.

pub mod classifier;
pub mod debounce;
pub mod dispatcher;
pub mod fees;

pub use classifier::{classify, ErrorKind, Verdict};
pub use debounce::Debouncer;
pub use dispatcher::dispatch;
pub use fees::{FeeEstimate, FeeEstimator};

use crate::sdk::{RouteFees, RouteSimulation};
use serde::{Deserialize, Serialize};

/// Outcome of one route simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SimulationOutcome {
    /// A cross-chain route exists
    CaRoute {
        fees: RouteFees,
        #[serde(rename = "insufficientBalance")]
        insufficient_balance: bool,
        raw: RouteSimulation,
    },
    /// No route needed: run the operation directly on one chain
    DirectOperation {
        #[serde(rename = "fallbackFees")]
        fallback_fees: FeeEstimate,
    },
    Error {
        kind: ErrorKind,
        message: String,
        retryable: bool,
    },
}

impl SimulationOutcome {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        SimulationOutcome::Error {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    /// Label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            SimulationOutcome::CaRoute { .. } => "ca_route",
            SimulationOutcome::DirectOperation { .. } => "direct_operation",
            SimulationOutcome::Error { kind, .. } => kind.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_wire_shape() {
        let outcome = SimulationOutcome::error(ErrorKind::Network, "timeout");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "status": "error",
                "kind": "NETWORK",
                "message": "timeout",
                "retryable": true
            })
        );

        let direct = SimulationOutcome::DirectOperation {
            fallback_fees: FeeEstimate::flat(0.005),
        };
        assert_eq!(
            serde_json::to_value(&direct).unwrap(),
            json!({
                "status": "direct_operation",
                "fallbackFees": { "gasSupplied": 0.005, "total": 0.005 }
            })
        );
        assert_eq!(direct.label(), "direct_operation");
    }
}
