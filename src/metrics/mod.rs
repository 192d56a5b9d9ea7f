//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Balance cache effectiveness
//! - SDK gateway requests
//! - Simulation outcomes
//! - Dataflow resolution gaps

use crate::error::{EngineError, EngineResult};
use crate::sdk::SdkErrorCode;
use crate::simulation::SimulationOutcome;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Balance cache metrics
    pub static ref BALANCE_CACHE_HITS: CounterVec = register_counter_vec!(
        "chainflow_balance_cache_hits_total",
        "Balance reads served from cache",
        &["swappable"]
    ).unwrap();

    pub static ref BALANCE_CACHE_MISSES: CounterVec = register_counter_vec!(
        "chainflow_balance_cache_misses_total",
        "Balance reads that went upstream",
        &["swappable"]
    ).unwrap();

    pub static ref BALANCE_STALE_SERVED: CounterVec = register_counter_vec!(
        "chainflow_balance_stale_served_total",
        "Stale balances served after a transient refresh failure",
        &["swappable"]
    ).unwrap();

    // SDK metrics
    pub static ref SDK_REQUESTS: CounterVec = register_counter_vec!(
        "chainflow_sdk_requests_total",
        "SDK gateway requests by endpoint and result",
        &["endpoint", "result"]
    ).unwrap();

    // Simulation metrics
    pub static ref SIMULATION_OUTCOMES: CounterVec = register_counter_vec!(
        "chainflow_simulation_outcomes_total",
        "Simulation outcomes by operation and status",
        &["operation", "outcome"]
    ).unwrap();

    // Resolution metrics
    pub static ref UNRESOLVED_INPUTS: Counter = register_counter!(
        "chainflow_unresolved_inputs_total",
        "Inherited inputs that found no upstream value"
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> EngineResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| EngineError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| EngineError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Text exposition of every registered metric
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// Helper functions to record metrics

fn swappable_label(include_swappable: bool) -> &'static str {
    if include_swappable {
        "true"
    } else {
        "false"
    }
}

pub fn record_balance_cache_hit(include_swappable: bool) {
    BALANCE_CACHE_HITS
        .with_label_values(&[swappable_label(include_swappable)])
        .inc();
}

pub fn record_balance_cache_miss(include_swappable: bool) {
    BALANCE_CACHE_MISSES
        .with_label_values(&[swappable_label(include_swappable)])
        .inc();
}

pub fn record_balance_stale_served(include_swappable: bool) {
    BALANCE_STALE_SERVED
        .with_label_values(&[swappable_label(include_swappable)])
        .inc();
}

pub fn record_sdk_request(endpoint: &str, failure: Option<SdkErrorCode>) {
    let result = failure.map(|code| code.as_str()).unwrap_or("ok");
    SDK_REQUESTS.with_label_values(&[endpoint, result]).inc();
}

pub fn record_simulation(operation: &str, outcome: &SimulationOutcome) {
    SIMULATION_OUTCOMES
        .with_label_values(&[operation, outcome.label()])
        .inc();
}

pub fn record_unresolved_input() {
    UNRESOLVED_INPUTS.inc();
}
