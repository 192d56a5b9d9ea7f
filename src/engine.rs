//! Engine facade wiring resolution, balances and simulation together

use crate::balance::{BalanceCache, Clock, SystemClock};
use crate::config::{EngineConfig, Settings};
use crate::error::{EngineError, EngineResult};
use crate::graph::{validate, ConfigValue, NodeKind, ValidationReport, Workflow};
use crate::resolver::{self, EffectiveConfig};
use crate::sdk::{self, ChainAbstractionSdk, ChainInfo, GatewaySdk, RouteParams, TokenBalance};
use crate::simulation::{dispatch, Debouncer, ErrorKind, FeeEstimate, FeeEstimator, SimulationOutcome};

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TOKEN_KEYS: &[&str] = &["token", "fromToken"];
const SOURCE_CHAIN_KEYS: &[&str] = &["sourceChainId", "fromChainId", "chainId"];
const DESTINATION_CHAIN_KEYS: &[&str] = &["destinationChainId", "toChainId"];
const RECIPIENT_KEYS: &[&str] = &["recipient", "address"];

/// Whether a simulated operation may go ahead
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum ExecutionGate {
    Proceed,
    Blocked { reason: String },
}

impl ExecutionGate {
    pub fn is_proceed(&self) -> bool {
        matches!(self, ExecutionGate::Proceed)
    }

    fn blocked(reason: impl Into<String>) -> Self {
        ExecutionGate::Blocked {
            reason: reason.into(),
        }
    }
}

/// Workflow engine
pub struct FlowEngine {
    sdk: Arc<dyn ChainAbstractionSdk>,
    balances: BalanceCache,
    fees: FeeEstimator,
    debouncer: Debouncer,
}

impl FlowEngine {
    /// Create an engine talking to the configured SDK gateway
    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let sdk = Arc::new(GatewaySdk::new(&settings.sdk)?);
        Ok(Self::new(
            sdk,
            Arc::new(SystemClock),
            &settings.engine,
            FeeEstimator::from_config(&settings.fees),
        ))
    }

    pub fn new(
        sdk: Arc<dyn ChainAbstractionSdk>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
        fees: FeeEstimator,
    ) -> Self {
        Self {
            balances: BalanceCache::new(sdk.clone(), clock, config.balance_ttl()),
            debouncer: Debouncer::new(config.debounce()),
            sdk,
            fees,
        }
    }

    // ========== Resolution ==========

    /// Resolve one config value of `node_id`
    pub fn resolve(&self, workflow: &Workflow, node_id: &str, input_key: &str, raw: &ConfigValue) -> ConfigValue {
        resolver::resolve(workflow, node_id, input_key, raw)
    }

    /// Resolve a node's whole config. Graphs with error-level issues
    /// (fan-in, cycles, duplicate ids) are rejected first.
    pub fn resolve_config(&self, workflow: &Workflow, node_id: &str) -> EngineResult<EffectiveConfig> {
        workflow.ensure_valid()?;
        resolver::resolve_config(workflow, node_id)
    }

    pub fn validate(&self, workflow: &Workflow) -> ValidationReport {
        validate(workflow)
    }

    // ========== Balances ==========

    pub async fn get_balances(&self, include_swappable: bool) -> EngineResult<Vec<TokenBalance>> {
        self.balances.get_balances(include_swappable).await
    }

    pub fn balance_cache(&self) -> &BalanceCache {
        &self.balances
    }

    pub fn invalidate_cache(&self) {
        self.balances.invalidate();
    }

    /// Call after a node's on-chain operation has executed
    pub fn record_completed_operation(&self, kind: &NodeKind) {
        if mutates_state(kind) {
            info!("{} completed, invalidating balances", kind.as_str());
            self.balances.invalidate();
        }
    }

    // ========== Simulation ==========

    /// Simulate a route for already-built parameters
    pub async fn dispatch(&self, params: &RouteParams) -> SimulationOutcome {
        let fallback = self.fallback_fee_for(params);
        dispatch(|| self.sdk.simulate_route(params), &params.operation, fallback).await
    }

    /// Resolve `node_id`, check balances and simulate its operation
    pub async fn simulate_node(&self, workflow: &Workflow, node_id: &str) -> EngineResult<SimulationOutcome> {
        let config = self.resolve_config(workflow, node_id)?;
        let kind = workflow
            .node(node_id)
            .map(|n| n.kind.clone())
            .ok_or_else(|| EngineError::NodeNotFound {
                workflow_id: workflow.id.clone(),
                node_id: node_id.to_string(),
            })?;

        if !mutates_state(&kind) {
            return Ok(SimulationOutcome::error(
                ErrorKind::Validation,
                format!("{} nodes have no on-chain operation", kind.as_str()),
            ));
        }

        if let Err(e) = config.require_resolved() {
            return Ok(SimulationOutcome::error(ErrorKind::Validation, e.to_string()));
        }

        let params = route_params(&kind, &config);

        match self.unified_shortfall(&params).await {
            Ok(Some(reason)) => {
                return Ok(SimulationOutcome::error(ErrorKind::InsufficientBalance, reason));
            }
            Ok(None) => {}
            Err(e) => warn!("Balance pre-check for {} skipped: {}", node_id, e),
        }

        Ok(self.dispatch(&params).await)
    }

    /// Like [`simulate_node`](Self::simulate_node) but debounced per node.
    ///
    /// Returns `Ok(None)` when a newer request for the same node superseded
    /// this one.
    pub async fn simulate_node_debounced(
        &self,
        workflow: &Workflow,
        node_id: &str,
    ) -> EngineResult<Option<SimulationOutcome>> {
        let key = format!("{}/{}", workflow.id, node_id);
        self.debouncer
            .run(&key, || self.simulate_node(workflow, node_id))
            .await
            .transpose()
    }

    /// Decide whether an operation may execute given its simulation outcome
    pub async fn preflight(&self, outcome: &SimulationOutcome, params: &RouteParams) -> EngineResult<ExecutionGate> {
        match outcome {
            SimulationOutcome::CaRoute {
                insufficient_balance: true,
                ..
            } => Ok(ExecutionGate::blocked("available balance does not cover the route")),
            SimulationOutcome::CaRoute { .. } => Ok(ExecutionGate::Proceed),
            SimulationOutcome::DirectOperation { .. } => self.direct_balance_gate(params).await,
            SimulationOutcome::Error { message, .. } => Ok(ExecutionGate::blocked(message.clone())),
        }
    }

    // ========== Fees & chains ==========

    pub fn estimate_fallback_fee(&self, operation: &str, chain_id: u64) -> FeeEstimate {
        self.fees.estimate(operation, chain_id)
    }

    pub async fn supported_chains(&self) -> EngineResult<Vec<ChainInfo>> {
        Ok(self.sdk.list_supported_chains().await?)
    }

    fn fallback_fee_for(&self, params: &RouteParams) -> FeeEstimate {
        match params.fee_chain_id() {
            Some(chain_id) => self.fees.estimate(&params.operation, chain_id),
            None => self.fees.default_estimate(),
        }
    }

    /// Shortfall against the balance summed over all chains
    async fn unified_shortfall(&self, params: &RouteParams) -> EngineResult<Option<String>> {
        let (Some(token), Some(amount)) = (params.token.as_deref(), required_amount(params)) else {
            return Ok(None);
        };

        let balances = self.balances.get_balances(false).await?;
        let held = find_token(&balances, token).and_then(TokenBalance::total).unwrap_or(0.0);

        debug!("Pre-check {}: need {}, hold {}", token, amount, held);
        Ok((held < amount).then(|| format!("Insufficient {} balance: need {}, have {}", token, amount, held)))
    }

    /// A direct operation runs on the source chain only, so that chain's
    /// balance has to cover the amount.
    async fn direct_balance_gate(&self, params: &RouteParams) -> EngineResult<ExecutionGate> {
        let Some(token) = params.token.as_deref() else {
            return Ok(ExecutionGate::blocked("no token to check the balance of"));
        };
        let Some(amount) = required_amount(params) else {
            return Ok(ExecutionGate::blocked("amount is missing or not a decimal"));
        };

        let balances = self.balances.get_balances(false).await?;
        let held = find_token(&balances, token).and_then(|b| match params.source_chain_id {
            Some(chain_id) => b.on_chain(chain_id),
            None => b.total(),
        });

        match held {
            Some(held) if held >= amount => Ok(ExecutionGate::Proceed),
            Some(held) => Ok(ExecutionGate::blocked(format!(
                "Insufficient {} on source chain: need {}, have {}",
                token, amount, held
            ))),
            None => Ok(ExecutionGate::blocked(format!("No {} balance on source chain", token))),
        }
    }
}

fn mutates_state(kind: &NodeKind) -> bool {
    !matches!(kind, NodeKind::Trigger | NodeKind::Condition)
}

fn required_amount(params: &RouteParams) -> Option<f64> {
    params.amount.as_deref().and_then(sdk::parse_decimal)
}

fn find_token<'a>(balances: &'a [TokenBalance], symbol: &str) -> Option<&'a TokenBalance> {
    balances.iter().find(|b| b.symbol.eq_ignore_ascii_case(symbol))
}

/// Build SDK route parameters from a resolved node config
pub fn route_params(kind: &NodeKind, config: &EffectiveConfig) -> RouteParams {
    let first_string = |keys: &[&str]| keys.iter().find_map(|k| config.get_string(k));
    let first_u64 = |keys: &[&str]| keys.iter().find_map(|k| config.get_u64(k));

    RouteParams {
        operation: kind.as_str().to_string(),
        token: TOKEN_KEYS.iter().find_map(|k| token_symbol(config.get(k)?)),
        amount: config.get_string("amount"),
        source_chain_id: first_u64(SOURCE_CHAIN_KEYS),
        destination_chain_id: first_u64(DESTINATION_CHAIN_KEYS),
        recipient: first_string(RECIPIENT_KEYS),
    }
}

// tokens are either a bare symbol or an object carrying one
fn token_symbol(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("symbol").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}
