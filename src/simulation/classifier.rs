//! Simulation failure taxonomy
//!
//! Works on structured [`SdkErrorCode`]s only. Raw failure text is turned
//! into a code at the SDK boundary, see `SdkError::from_message`.

use crate::sdk::{SdkError, SdkErrorCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InsufficientBalance,
    NoRoute,
    Network,
    Validation,
    Unknown,
}

impl ErrorKind {
    /// Whether the same input may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::NoRoute => "NO_ROUTE",
            ErrorKind::Network => "NETWORK",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

/// What a simulation failure means for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not a failure: the SDK says no cross-chain route applies
    DirectOperation,
    Failure { kind: ErrorKind, retryable: bool },
}

/// Classify a simulation failure into exactly one verdict
pub fn classify(err: &SdkError) -> Verdict {
    let kind = match err.code {
        SdkErrorCode::CaNotApplicable => return Verdict::DirectOperation,
        SdkErrorCode::InsufficientBalance => ErrorKind::InsufficientBalance,
        SdkErrorCode::NoRoute => ErrorKind::NoRoute,
        SdkErrorCode::Network | SdkErrorCode::Timeout => ErrorKind::Network,
        SdkErrorCode::Validation => ErrorKind::Validation,
        SdkErrorCode::UpstreamProvider | SdkErrorCode::Unknown => ErrorKind::Unknown,
    };

    Verdict::Failure {
        kind,
        retryable: kind.is_retryable(),
    }
}
