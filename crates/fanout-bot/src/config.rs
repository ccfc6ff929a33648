//! Application configuration.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! minimal file only names what differs.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fanout_exchange::{Endpoint, OkxClientConfig, RateRule, RetryConfig, DEFAULT_BASE_URL};
use fanout_executor::{DispatcherConfig, MAX_BATCH_ORDERS};

use crate::error::{AppError, AppResult};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// JSON array of `{accessKey, secretKey, passphrase, label?}` records.
    #[serde(default = "default_accounts_file")]
    pub accounts_file: String,

    #[serde(default)]
    pub exchange: ExchangeConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_accounts_file() -> String {
    "config/accounts.json".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            accounts_file: default_accounts_file(),
            exchange: ExchangeConfig::default(),
            execution: ExecutionConfig::default(),
            retry: RetryConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Exchange connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Demo trading (`x-simulated-trading: 1`).
    #[serde(default)]
    pub simulated: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            simulated: false,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Fan-out behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_client_order_prefix")]
    pub client_order_prefix: String,
    #[serde(default = "default_max_orders_per_batch")]
    pub max_orders_per_batch: usize,
    /// Floor pause between chunks; rate limiting does the real pacing.
    #[serde(default)]
    pub chunk_pause_ms: u64,
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
}

fn default_client_order_prefix() -> String {
    "fanout".to_string()
}

fn default_max_orders_per_batch() -> usize {
    MAX_BATCH_ORDERS
}

fn default_leverage() -> u32 {
    fanout_core::DEFAULT_LEVERAGE
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            client_order_prefix: default_client_order_prefix(),
            max_orders_per_batch: default_max_orders_per_batch(),
            chunk_pause_ms: 0,
            default_leverage: default_leverage(),
        }
    }
}

/// Per-endpoint overrides of the OKX documented ceilings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruments: Option<RateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<RateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_avail_size: Option<RateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<RateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_leverage: Option<RateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_orders: Option<RateRule>,
}

impl RateLimitsConfig {
    fn entries(&self) -> [(Endpoint, Option<RateRule>); 6] {
        [
            (Endpoint::Instruments, self.instruments),
            (Endpoint::MaxSize, self.max_size),
            (Endpoint::MaxAvailSize, self.max_avail_size),
            (Endpoint::Positions, self.positions),
            (Endpoint::SetLeverage, self.set_leverage),
            (Endpoint::BatchOrders, self.batch_orders),
        ]
    }

    /// Configured overrides; missing endpoints fall back to the defaults.
    pub fn rules(&self) -> HashMap<Endpoint, RateRule> {
        self.entries()
            .into_iter()
            .filter_map(|(endpoint, rule)| rule.map(|rule| (endpoint, rule)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> AppResult<()> {
        if self.accounts_file.trim().is_empty() {
            return Err(AppError::Config("accounts_file must be set".to_string()));
        }
        if self.exchange.base_url.trim().is_empty() {
            return Err(AppError::Config("exchange.base_url must be set".to_string()));
        }
        if self.exchange.timeout_ms == 0 {
            return Err(AppError::Config(
                "exchange.timeout_ms must be positive".to_string(),
            ));
        }
        self.dispatcher_config()
            .validate()
            .map_err(|e| AppError::Config(format!("execution: {e}")))?;
        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(AppError::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        for (endpoint, rule) in self.rate_limits.entries() {
            if let Some(rule) = rule {
                if rule.requests == 0 || rule.per_ms == 0 {
                    return Err(AppError::Config(format!(
                        "rate_limits.{endpoint}: requests and per_ms must be positive"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn client_config(&self) -> OkxClientConfig {
        OkxClientConfig::default()
            .with_base_url(self.exchange.base_url.clone())
            .with_simulated(self.exchange.simulated)
            .with_timeout(Duration::from_millis(self.exchange.timeout_ms))
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_orders_per_batch: self.execution.max_orders_per_batch,
            chunk_pause: Duration::from_millis(self.execution.chunk_pause_ms),
            client_order_prefix: self.execution.client_order_prefix.clone(),
            default_leverage: self.execution.default_leverage,
        }
    }
}
