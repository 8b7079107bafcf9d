//! Broker configuration

use anyhow::{Context, Result};
use broker_lib::optimizer::DEFAULT_BUDGET_LIMIT;
use broker_lib::persistence::{AllocationSink, JsonlAllocationLog, NullSink};
use broker_lib::provisioning::RetryPolicy;
use broker_lib::rates::{RateEntry, RateOverrides};
use broker_lib::{BrokerResult, RateTable};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "BROKER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Broker configuration
#[derive(Clone, Deserialize)]
pub struct BrokerConfig {
    /// Credential for the general-purpose cloud, passed through to provisioning
    #[serde(default)]
    pub alibaba_api_key: String,

    /// Credential for the GPU marketplace, passed through to provisioning
    #[serde(default)]
    pub vastai_api_key: String,

    /// Monthly spend ceiling for the optimizer
    #[serde(default = "default_budget_limit")]
    pub budget_limit: f64,

    /// Advisory only
    #[serde(default = "default_auto_scaling")]
    pub auto_scaling: bool,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON-lines allocation log; empty disables it
    #[serde(default = "default_allocation_log_path")]
    pub allocation_log_path: String,

    /// Rates layered over the built-in table
    #[serde(default)]
    pub hourly_rates: Vec<RateEntry>,

    #[serde(default = "default_provision_timeout")]
    pub provision_timeout_secs: u64,

    #[serde(default = "default_provision_attempts")]
    pub provision_max_attempts: u32,
}

fn default_budget_limit() -> f64 {
    DEFAULT_BUDGET_LIMIT
}

fn default_auto_scaling() -> bool {
    true
}

fn default_api_port() -> u16 {
    8080
}

fn default_allocation_log_path() -> String {
    "allocations.log".to_string()
}

fn default_provision_timeout() -> u64 {
    30
}

fn default_provision_attempts() -> u32 {
    3
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            alibaba_api_key: String::new(),
            vastai_api_key: String::new(),
            budget_limit: default_budget_limit(),
            auto_scaling: default_auto_scaling(),
            api_port: default_api_port(),
            allocation_log_path: default_allocation_log_path(),
            hourly_rates: Vec::new(),
            provision_timeout_secs: default_provision_timeout(),
            provision_max_attempts: default_provision_attempts(),
        }
    }
}

// Credentials stay out of logs
impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("alibaba_api_key", &redact(&self.alibaba_api_key))
            .field("vastai_api_key", &redact(&self.vastai_api_key))
            .field("budget_limit", &self.budget_limit)
            .field("auto_scaling", &self.auto_scaling)
            .field("api_port", &self.api_port)
            .field("allocation_log_path", &self.allocation_log_path)
            .field("hourly_rates", &self.hourly_rates)
            .field("provision_timeout_secs", &self.provision_timeout_secs)
            .field("provision_max_attempts", &self.provision_max_attempts)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl BrokerConfig {
    /// Load from `$BROKER_CONFIG` (or `config.json`) and `BROKER_*` variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load from a specific file, layered under `BROKER_*` variables.
    ///
    /// A missing file falls back to defaults. A file that exists but cannot
    /// be parsed is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            info!(path = %path.display(), "Loading configuration file");
        } else {
            warn!(
                path = %path.display(),
                "Configuration file not found, using defaults"
            );
        }

        let config = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("BROKER").try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", path))?;

        config
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {:?}", path))
    }

    /// Built-in rates with the configured overrides applied
    pub fn build_rate_table(&self) -> BrokerResult<RateTable> {
        let mut overrides = RateOverrides::new();
        for entry in &self.hourly_rates {
            overrides
                .entry(entry.provider)
                .or_default()
                .insert(entry.tier.clone(), entry.cost_per_hour);
        }

        let mut rates = RateTable::standard();
        rates.overlay(&overrides)?;
        Ok(rates)
    }

    /// Allocation log sink, or a discarding sink when the path is empty
    pub fn build_sink(&self) -> Arc<dyn AllocationSink> {
        if self.allocation_log_path.trim().is_empty() {
            Arc::new(NullSink)
        } else {
            Arc::new(JsonlAllocationLog::new(&self.allocation_log_path))
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.provision_max_attempts,
            timeout: Duration::from_secs(self.provision_timeout_secs),
            ..RetryPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_lib::Provider;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = BrokerConfig::load_from(&temp_dir.path().join("absent.json")).unwrap();

        assert_eq!(config.budget_limit, 1500.0);
        assert!(config.auto_scaling);
        assert_eq!(config.allocation_log_path, "allocations.log");
        assert!(config.hourly_rates.is_empty());
        assert_eq!(config.provision_max_attempts, 3);
    }

    #[test]
    fn test_file_values_are_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "budget_limit": 900,
                "auto_scaling": false,
                "vastai_api_key": "secret",
                "allocation_log_path": "",
                "hourly_rates": [
                    {{"provider": "vastai_ondemand", "tier": "RTX 3090", "cost_per_hour": 0.19}}
                ]
            }}"#
        )
        .unwrap();

        let config = BrokerConfig::load_from(&path).unwrap();
        assert_eq!(config.budget_limit, 900.0);
        assert!(!config.auto_scaling);
        assert_eq!(config.vastai_api_key, "secret");

        let rates = config.build_rate_table().unwrap();
        assert_eq!(rates.rate(Provider::VastaiOndemand, "RTX 3090").unwrap(), 0.19);
        assert_eq!(rates.rate(Provider::Alibaba, "ecs.g6.large").unwrap(), 0.12);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(BrokerConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_negative_override_rejected() {
        let config = BrokerConfig {
            hourly_rates: vec![RateEntry {
                provider: Provider::Alibaba,
                tier: "ecs.g6.large".to_string(),
                cost_per_hour: -1.0,
            }],
            ..BrokerConfig::default()
        };
        assert!(config.build_rate_table().is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = BrokerConfig {
            alibaba_api_key: "ak-123".to_string(),
            ..BrokerConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ak-123"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = BrokerConfig {
            provision_timeout_secs: 5,
            provision_max_attempts: 7,
            ..BrokerConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.attempts, 7);
        assert_eq!(policy.timeout, Duration::from_secs(5));
    }
}
