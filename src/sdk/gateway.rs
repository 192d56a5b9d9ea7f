//! HTTP gateway in front of the chain-abstraction SDK
//!
//! The SDK itself runs out of process; the gateway exposes it as JSON:
//! - `POST /balances` with `{"includeSwappable": bool}`
//! - `POST /simulate` with [`RouteParams`], answering a route or `null`
//! - `GET /chains`
//!
//! Failed calls answer non-2xx with `{"code": "...", "message": "..."}`.

use super::{ChainAbstractionSdk, ChainInfo, RouteParams, RouteSimulation, SdkError, SdkErrorCode, TokenBalance};
use crate::config::SdkConfig;
use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// SDK client backed by the HTTP gateway
pub struct GatewaySdk {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BalancesRequest {
    include_swappable: bool,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl GatewaySdk {
    /// Create a new gateway client
    pub fn new(config: &SdkConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("chainflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build gateway client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SdkError> {
        let result = self.send(request).await;
        crate::metrics::record_sdk_request(endpoint, result.as_ref().err().map(|e| e.code));
        result
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, SdkError> {
        let resp = request.send().await.map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body));
        }

        resp.json::<T>().await.map_err(transport_error)
    }
}

#[async_trait]
impl ChainAbstractionSdk for GatewaySdk {
    async fn fetch_unified_balances(
        &self,
        include_swappable: bool,
    ) -> Result<Vec<TokenBalance>, SdkError> {
        debug!("Fetching unified balances (swappable: {})", include_swappable);
        let request = self
            .client
            .post(self.url("balances"))
            .json(&BalancesRequest { include_swappable });
        self.read("balances", request).await
    }

    async fn simulate_route(
        &self,
        params: &RouteParams,
    ) -> Result<Option<RouteSimulation>, SdkError> {
        debug!("Simulating route for {}", params.operation);
        let request = self.client.post(self.url("simulate")).json(params);
        self.read("simulate", request).await
    }

    async fn list_supported_chains(&self) -> Result<Vec<ChainInfo>, SdkError> {
        self.read("chains", self.client.get(self.url("chains"))).await
    }
}

/// Map a non-2xx gateway answer to a typed error
fn error_from_response(status: u16, body: &str) -> SdkError {
    if let Ok(parsed) = serde_json::from_str::<GatewayErrorBody>(body) {
        if let Some(code) = parsed.code.as_deref().and_then(SdkErrorCode::parse) {
            return SdkError::new(code, parsed.message);
        }
        return SdkError::from_message(parsed.message);
    }

    match status {
        502 | 503 => SdkError::new(
            SdkErrorCode::UpstreamProvider,
            format!("gateway returned {}: {}", status, body),
        ),
        504 => SdkError::new(
            SdkErrorCode::Timeout,
            format!("gateway returned {}: {}", status, body),
        ),
        _ => SdkError::from_message(body),
    }
}

fn transport_error(e: reqwest::Error) -> SdkError {
    if e.is_timeout() {
        SdkError::new(SdkErrorCode::Timeout, e.to_string())
    } else if e.is_connect() || e.is_request() {
        SdkError::new(SdkErrorCode::Network, e.to_string())
    } else if e.is_decode() {
        SdkError::new(
            SdkErrorCode::Unknown,
            format!("malformed gateway response: {}", e),
        )
    } else {
        SdkError::from_message(e.to_string())
    }
}
