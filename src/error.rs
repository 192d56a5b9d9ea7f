//! Error types for the chainflow engine

use crate::sdk::SdkError;
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),

    #[error("Node {node_id} not found in workflow {workflow_id}")]
    NodeNotFound { workflow_id: String, node_id: String },

    #[error("Node {node_id} has unresolved inputs: {}", keys.join(", "))]
    Unresolved { node_id: String, keys: Vec<String> },

    #[error("Node {node_id} has no config entry {key}")]
    UnknownConfigKey { node_id: String, key: String },

    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Sdk(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::SdkErrorCode;

    #[test]
    fn test_only_transient_sdk_errors_are_retryable() {
        let timeout = EngineError::Sdk(SdkError::new(SdkErrorCode::Timeout, "request timed out"));
        assert!(timeout.is_retryable());

        let route = EngineError::Sdk(SdkError::new(SdkErrorCode::NoRoute, "no route"));
        assert!(!route.is_retryable());

        let unresolved = EngineError::Unresolved {
            node_id: "stake".into(),
            keys: vec!["amount".into()],
        };
        assert!(!unresolved.is_retryable());
        assert_eq!(
            unresolved.to_string(),
            "Node stake has unresolved inputs: amount"
        );
    }
}
