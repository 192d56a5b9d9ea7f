//! Typed errors at the SDK boundary
//!
//! Gateways that report a structured code are mapped directly. Free-form
//! failure text is only ever interpreted here, in [`SdkError::from_message`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message the SDK uses to say a route is not needed for this operation
const CA_NOT_APPLICABLE: &str = "ca not applicable";

const INSUFFICIENT_BALANCE_MARKERS: &[&str] = &["insufficient balance", "insufficient funds"];
const NO_ROUTE_MARKERS: &[&str] = &["no route", "not supported", "route not found"];
const TIMEOUT_MARKERS: &[&str] = &["timeout"];
const NETWORK_MARKERS: &[&str] = &["network", "connection"];
const VALIDATION_MARKERS: &[&str] = &["invalid", "validation", "parameter"];
const UPSTREAM_PROVIDER_MARKERS: &[&str] = &[
    "coingecko",
    "upstream",
    "bad gateway",
    "service unavailable",
    "too many requests",
];

/// Structured failure codes reported by the chain-abstraction layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdkErrorCode {
    /// Not an error: the operation should run directly on one chain
    CaNotApplicable,
    InsufficientBalance,
    NoRoute,
    Network,
    Timeout,
    /// A named upstream dependency (price feed, indexer) is failing
    UpstreamProvider,
    Validation,
    Unknown,
}

impl SdkErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkErrorCode::CaNotApplicable => "ca_not_applicable",
            SdkErrorCode::InsufficientBalance => "insufficient_balance",
            SdkErrorCode::NoRoute => "no_route",
            SdkErrorCode::Network => "network",
            SdkErrorCode::Timeout => "timeout",
            SdkErrorCode::UpstreamProvider => "upstream_provider",
            SdkErrorCode::Validation => "validation",
            SdkErrorCode::Unknown => "unknown",
        }
    }

    /// Parse a wire code, ignoring case
    pub fn parse(code: &str) -> Option<Self> {
        let code = match code.trim().to_ascii_lowercase().as_str() {
            "ca_not_applicable" => SdkErrorCode::CaNotApplicable,
            "insufficient_balance" => SdkErrorCode::InsufficientBalance,
            "no_route" => SdkErrorCode::NoRoute,
            "network" => SdkErrorCode::Network,
            "timeout" => SdkErrorCode::Timeout,
            "upstream_provider" => SdkErrorCode::UpstreamProvider,
            "validation" => SdkErrorCode::Validation,
            "unknown" => SdkErrorCode::Unknown,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for SdkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by a [`super::ChainAbstractionSdk`] call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct SdkError {
    pub code: SdkErrorCode,
    pub message: String,
}

impl SdkError {
    pub fn new(code: SdkErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build an error from raw failure text.
    ///
    /// Case-insensitive, first match wins: exact "ca not applicable", then
    /// insufficient balance, missing route, timeout/network, validation and
    /// named upstream providers. Anything else is `Unknown`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.trim().to_lowercase();

        let code = if lower == CA_NOT_APPLICABLE {
            SdkErrorCode::CaNotApplicable
        } else if contains_any(&lower, INSUFFICIENT_BALANCE_MARKERS) {
            SdkErrorCode::InsufficientBalance
        } else if contains_any(&lower, NO_ROUTE_MARKERS) {
            SdkErrorCode::NoRoute
        } else if contains_any(&lower, TIMEOUT_MARKERS) {
            SdkErrorCode::Timeout
        } else if contains_any(&lower, NETWORK_MARKERS) {
            SdkErrorCode::Network
        } else if contains_any(&lower, VALIDATION_MARKERS) {
            SdkErrorCode::Validation
        } else if contains_any(&lower, UPSTREAM_PROVIDER_MARKERS) {
            SdkErrorCode::UpstreamProvider
        } else {
            SdkErrorCode::Unknown
        };

        Self { code, message }
    }

    /// Infrastructure failures that are worth serving stale data over
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            SdkErrorCode::Network | SdkErrorCode::Timeout | SdkErrorCode::UpstreamProvider
        )
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
