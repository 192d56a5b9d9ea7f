//! HTTP API for resolution, balances and simulation

use crate::config::ApiConfig;
use crate::engine::{route_params, ExecutionGate, FlowEngine};
use crate::error::{EngineError, EngineResult};
use crate::graph::{ConfigValue, ValidationReport, Workflow};
use crate::resolver::{self, EffectiveConfig, Resolution};
use crate::simulation::{FeeEstimate, SimulationOutcome};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FlowEngine>,
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, engine: Arc<FlowEngine>) -> EngineResult<()> {
    let app = router(engine);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| EngineError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

pub fn router(engine: Arc<FlowEngine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/balances", get(get_balances))
        .route("/balances/invalidate", post(invalidate_balances))
        .route("/resolve", post(resolve_input))
        .route("/resolve/config", post(resolve_config))
        .route("/validate", post(validate_workflow))
        .route("/simulate", post(simulate))
        .route("/fees/:operation/:chain_id", get(get_fee))
        .route("/chains", get(get_chains))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

/// Engine error rendered as a JSON body
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NodeNotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Unresolved { .. }
            | EngineError::UnknownConfigKey { .. }
            | EngineError::InvalidGraph(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Sdk(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Sdk(_) => StatusCode::BAD_GATEWAY,
            EngineError::Config(_) | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            warn!("API request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                retryable: self.0.is_retryable(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_balances(
    State(state): State<AppState>,
    Query(query): Query<BalancesQuery>,
) -> ApiResult<crate::balance::BalanceSnapshot> {
    let snapshot = state
        .engine
        .balance_cache()
        .snapshot(query.include_swappable)
        .await?;
    Ok(Json(snapshot))
}

async fn invalidate_balances(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.invalidate_cache();
    Json(InvalidateResponse { invalidated: true })
}

/// Resolve a single input. An absent or `null` `value` means "use the node's
/// own config entry for `inputKey`", which must then exist.
async fn resolve_input(
    State(_state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Resolution> {
    let node = req
        .workflow
        .node(&req.node_id)
        .ok_or_else(|| EngineError::NodeNotFound {
            workflow_id: req.workflow.id.clone(),
            node_id: req.node_id.clone(),
        })?;

    let raw = match req.value {
        Some(value) => value,
        None => node
            .config
            .get(&req.input_key)
            .cloned()
            .ok_or_else(|| EngineError::UnknownConfigKey {
                node_id: req.node_id.clone(),
                key: req.input_key.clone(),
            })?,
    };

    Ok(Json(resolver::resolve_traced(
        &req.workflow,
        &req.node_id,
        &req.input_key,
        &raw,
    )))
}

async fn resolve_config(
    State(state): State<AppState>,
    Json(req): Json<NodeRequest>,
) -> ApiResult<EffectiveConfig> {
    Ok(Json(state.engine.resolve_config(&req.workflow, &req.node_id)?))
}

async fn validate_workflow(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Json<ValidationReport> {
    Json(state.engine.validate(&req.workflow))
}

async fn simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> ApiResult<SimulateResponse> {
    let engine = &state.engine;

    let outcome = if req.debounce {
        engine
            .simulate_node_debounced(&req.workflow, &req.node_id)
            .await?
    } else {
        Some(engine.simulate_node(&req.workflow, &req.node_id).await?)
    };

    let gate = match (&outcome, req.preflight) {
        (Some(outcome), true) => {
            let config = engine.resolve_config(&req.workflow, &req.node_id)?;
            let kind = req
                .workflow
                .node(&req.node_id)
                .map(|n| n.kind.clone())
                .ok_or_else(|| EngineError::NodeNotFound {
                    workflow_id: req.workflow.id.clone(),
                    node_id: req.node_id.clone(),
                })?;
            Some(engine.preflight(outcome, &route_params(&kind, &config)).await?)
        }
        _ => None,
    };

    Ok(Json(SimulateResponse {
        superseded: outcome.is_none(),
        outcome,
        gate,
    }))
}

async fn get_fee(
    State(state): State<AppState>,
    Path((operation, chain_id)): Path<(String, u64)>,
) -> Json<FeeEstimate> {
    Json(state.engine.estimate_fallback_fee(&operation, chain_id))
}

async fn get_chains(State(state): State<AppState>) -> ApiResult<ChainsResponse> {
    let chains = state.engine.supported_chains().await?;
    Ok(Json(ChainsResponse { chains }))
}

// Request types

#[derive(Deserialize)]
struct BalancesQuery {
    #[serde(default)]
    include_swappable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    workflow: Workflow,
    node_id: String,
    input_key: String,
    #[serde(default)]
    value: Option<ConfigValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRequest {
    workflow: Workflow,
    node_id: String,
}

#[derive(Deserialize)]
struct ValidateRequest {
    workflow: Workflow,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateRequest {
    workflow: Workflow,
    node_id: String,
    #[serde(default)]
    debounce: bool,
    #[serde(default)]
    preflight: bool,
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

#[derive(Serialize)]
struct InvalidateResponse {
    invalidated: bool,
}

#[derive(Serialize)]
struct SimulateResponse {
    superseded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<SimulationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gate: Option<ExecutionGate>,
}

#[derive(Serialize)]
struct ChainsResponse {
    chains: Vec<crate::sdk::ChainInfo>,
}
