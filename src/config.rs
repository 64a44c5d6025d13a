//! Configuration types for capguard

use crate::broker::CapitalConfig;
use crate::risk::RiskRules;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub risk: RiskRules,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Broker connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
    pub identifier: String,
    pub password: String,
    /// Per-request timeout; a hung call must not stall the loop
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_confirm_retries")]
    pub confirm_retries: u32,
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
    #[serde(default = "default_currency")]
    pub currency_code: String,
}

impl BrokerConfig {
    /// Build the client configuration
    pub fn to_capital_config(&self) -> CapitalConfig {
        CapitalConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            identifier: self.identifier.clone(),
            password: self.password.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            confirm_retries: self.confirm_retries,
            confirm_delay: Duration::from_millis(self.confirm_delay_ms),
        }
    }
}

/// Webhook listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// `timeframe` value that routes an alert to the regime tracker
    #[serde(default = "default_regime_timeframe")]
    pub regime_timeframe: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            regime_timeframe: default_regime_timeframe(),
        }
    }
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Durable storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Notification push configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// URL receiving `{"text": ...}` pushes; log-only when unset
    #[serde(default)]
    pub push_url: Option<String>,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            push_url: None,
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    crate::broker::DEMO_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_confirm_retries() -> u32 {
    5
}

fn default_confirm_delay_ms() -> u64 {
    300
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_regime_timeframe() -> String {
    "240".to_string()
}

fn default_interval_secs() -> u64 {
    15
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_notify_timeout_secs() -> u64 {
    5
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
