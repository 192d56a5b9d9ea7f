//! Configuration management for the chainflow engine
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    pub sdk: SdkConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub fees: FeeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How long fetched balances count as fresh
    #[serde(default = "default_balance_ttl_secs")]
    pub balance_ttl_secs: u64,
    /// Quiet period before a node simulation fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    pub gateway_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Fee used for pairs missing from the table
    #[serde(default = "default_fee")]
    pub default_fee: f64,
    #[serde(default)]
    pub overrides: Vec<FeeOverride>,
}

/// Extra or replacement entry for the fallback fee table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeeOverride {
    pub operation: String,
    pub chain_id: u64,
    pub gas_supplied: f64,
    pub total: f64,
}

fn default_balance_ttl_secs() -> u64 {
    30
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_fee() -> f64 {
    0.005
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            balance_ttl_secs: default_balance_ttl_secs(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_fee: default_fee(),
            overrides: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn balance_ttl(&self) -> Duration {
        Duration::from_secs(self.balance_ttl_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Settings {
    /// Load settings from the file named by `CHAINFLOW_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("CHAINFLOW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.engine.balance_ttl_secs == 0 {
            anyhow::bail!("engine.balance_ttl_secs must be greater than zero");
        }

        let url = self.sdk.gateway_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("sdk.gateway_url must be an http(s) URL, got {:?}", url);
        }

        if self.fees.default_fee < 0.0 {
            anyhow::bail!("fees.default_fee must not be negative");
        }

        for entry in &self.fees.overrides {
            if entry.gas_supplied < 0.0 || entry.total < 0.0 {
                anyhow::bail!(
                    "Fee override for {} on chain {} has a negative value",
                    entry.operation,
                    entry.chain_id
                );
            }
            if entry.total < entry.gas_supplied {
                tracing::warn!(
                    "Fee override for {} on chain {} has total below gas supplied",
                    entry.operation,
                    entry.chain_id
                );
            }
        }

        Ok(())
    }
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |cap: &Captures| env::var(&cap[1]).unwrap_or_default())
        .into_owned()
}
