use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::errors::WorkflowError;

/// Environment variable overriding `connection.endpoint`.
pub const ENDPOINT_ENV: &str = "CONTRACT_FLOW_RPC_URL";

/// Node connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// RPC endpoint URL (e.g. "http://localhost:8545")
    pub endpoint: String,

    /// Timeout for a single HTTP request (seconds)
    #[serde(default = "ConnectionConfig::default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay between receipt polls (milliseconds)
    #[serde(default = "ConnectionConfig::default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl ConnectionConfig {
    fn default_request_timeout() -> u64 { 10 }
    fn default_poll_interval() -> u64 { 500 }

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout_secs: Self::default_request_timeout(),
            poll_interval_ms: Self::default_poll_interval(),
        }
    }

    /// Parse and check the endpoint. Only HTTP transports are supported.
    pub fn validate(&self) -> Result<reqwest::Url, WorkflowError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(WorkflowError::Connection("endpoint is empty".to_string()));
        }
        let url = reqwest::Url::parse(endpoint).map_err(|e| {
            WorkflowError::Connection(format!("invalid endpoint URL: {}", e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(WorkflowError::Connection(format!(
                "unsupported endpoint scheme '{}', expected http or https",
                other
            ))),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("http://localhost:8545")
    }
}

/// How the gas limit of a built transaction is chosen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GasPolicy {
    /// Fixed gas limit; skips estimation when set
    #[serde(default)]
    pub gas_limit: Option<u64>,

    /// Safety margin added on top of the estimate (percent)
    #[serde(default = "GasPolicy::default_margin_percent")]
    pub margin_percent: u64,

    /// Used only when estimation fails
    #[serde(default = "GasPolicy::default_fallback_gas_limit")]
    pub fallback_gas_limit: u64,
}

impl GasPolicy {
    fn default_margin_percent() -> u64 { 20 }
    fn default_fallback_gas_limit() -> u64 { 1_000_000 }

    /// `estimate * (100 + margin) / 100`, saturating.
    pub fn with_margin(&self, estimate: ethers::types::U256) -> ethers::types::U256 {
        let factor = ethers::types::U256::from(100u64.saturating_add(self.margin_percent));
        estimate.saturating_mul(factor) / ethers::types::U256::from(100u64)
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            gas_limit: None,
            margin_percent: Self::default_margin_percent(),
            fallback_gas_limit: Self::default_fallback_gas_limit(),
        }
    }
}

/// Receipt waiting settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptConfig {
    #[serde(default = "ReceiptConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ReceiptConfig {
    fn default_timeout() -> u64 { 120 }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self { timeout_secs: Self::default_timeout() }
    }
}

/// Workflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub gas: GasPolicy,
    #[serde(default)]
    pub receipt: ReceiptConfig,
}

impl WorkflowConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, WorkflowError> {
        let config: WorkflowConfig =
            toml::from_str(content).map_err(|e| WorkflowError::Config(e.to_string()))?;
        config.connection.validate().map_err(|e| WorkflowError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `CONTRACT_FLOW_RPC_URL` if set.
    pub fn apply_env_overrides(mut self) -> Result<Self, WorkflowError> {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            self.connection.endpoint = endpoint;
            self.connection.validate().map_err(|e| WorkflowError::Config(e.to_string()))?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    #[test]
    fn test_defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.connection.endpoint, "http://localhost:8545");
        assert_eq!(config.connection.request_timeout_secs, 10);
        assert_eq!(config.gas.fallback_gas_limit, 1_000_000);
        assert_eq!(config.gas.margin_percent, 20);
        assert_eq!(config.receipt.timeout_secs, 120);
    }

    #[test]
    fn test_validate_rejects_empty_and_bad_scheme() {
        assert!(matches!(
            ConnectionConfig::new("  ").validate(),
            Err(WorkflowError::Connection(_))
        ));
        assert!(ConnectionConfig::new("ftp://node.example").validate().is_err());
        assert!(ConnectionConfig::new("not a url").validate().is_err());
        assert!(ConnectionConfig::new("https://node.example/v3/abc").validate().is_ok());
    }

    #[test]
    fn test_margin() {
        let policy = GasPolicy::default();
        assert_eq!(policy.with_margin(U256::from(100_000u64)), U256::from(120_000u64));
        let none = GasPolicy { margin_percent: 0, ..GasPolicy::default() };
        assert_eq!(none.with_margin(U256::from(21_000u64)), U256::from(21_000u64));
    }
}
