//! Chain-abstraction SDK boundary
//!
//! The engine never talks to chains directly. Everything it needs from the
//! outside world goes through [`ChainAbstractionSdk`]:
//! - Unified multi-chain balances
//! - Cross-chain route simulation
//! - Supported chain and token listing

mod error;
pub mod gateway;

pub use error::{SdkError, SdkErrorCode};
pub use gateway::GatewaySdk;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability surface the engine consumes from the chain-abstraction layer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainAbstractionSdk: Send + Sync {
    /// Fetch balances aggregated across every supported chain
    async fn fetch_unified_balances(
        &self,
        include_swappable: bool,
    ) -> Result<Vec<TokenBalance>, SdkError>;

    /// Dry-run a cross-chain route. `Ok(None)` means no route is needed.
    async fn simulate_route(
        &self,
        params: &RouteParams,
    ) -> Result<Option<RouteSimulation>, SdkError>;

    /// List chains and the tokens available on each
    async fn list_supported_chains(&self) -> Result<Vec<ChainInfo>, SdkError>;
}

/// Unified balance of one token across chains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub symbol: String,
    /// Decimal string
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_in_fiat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<ChainBalance>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalance {
    pub chain_id: u64,
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_in_fiat: Option<f64>,
}

impl TokenBalance {
    /// Total balance across all chains
    pub fn total(&self) -> Option<f64> {
        parse_decimal(&self.balance)
    }

    /// Balance held on a single chain, if the breakdown lists it
    pub fn on_chain(&self, chain_id: u64) -> Option<f64> {
        self.breakdown
            .as_ref()?
            .iter()
            .find(|b| b.chain_id == chain_id)
            .and_then(|b| parse_decimal(&b.balance))
    }
}

/// Fee breakdown of a simulated route (decimal strings)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFees {
    pub protocol: String,
    pub solver: String,
    pub gas_supplied: String,
    pub ca_gas: String,
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteIntent {
    pub fees: RouteFees,
    pub is_available_balance_insufficient: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a successful route simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSimulation {
    pub intent: RouteIntent,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters handed to `simulate_route`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParams {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl RouteParams {
    /// Chain whose fee table applies to this operation
    pub fn fee_chain_id(&self) -> Option<u64> {
        self.destination_chain_id.or(self.source_chain_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub tokens: Vec<ChainToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainToken {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    pub decimals: u8,
}

/// Parse a non-negative decimal string
pub(crate) fn parse_decimal(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with('+') {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}
