//! Configuration management for the storage miner chain client
//!
//! Supports loading from TOML files and environment variables.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sminer_core::{AccountId, KeyScheme, SigningIdentity, DEFAULT_SS58_PREFIX};
use thiserror::Error;

use crate::chain::constants::{
    DEFAULT_FILE_PORT, DEFAULT_HEALTH_INTERVAL, DEFAULT_INCLUSION_TIMEOUT, DEFAULT_PLEDGE_TOKENS,
    DEFAULT_CHECK_TIMEOUT, DEFAULT_METRICS_PORT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RPC_URL,
    DEFAULT_SERVICE_PORT,
};
use crate::chain::{parse_service_ip, CallNames, ChainClientConfig, HealthSettings, RegisterRequest};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete miner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Node connection and timing
    #[serde(default)]
    pub chain: ChainSettings,

    /// Miner identity and service endpoint
    #[serde(default)]
    pub miner: MinerSettings,

    /// Operation names as `Pallet.call`
    #[serde(default)]
    pub calls: CallNames,

    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl MinerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MinerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, using defaults when the file does not exist
    ///
    /// A file that exists but cannot be read, parsed or validated is an
    /// error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Validate the configuration
    ///
    /// The secret is not required here; commands that sign ask for it
    /// through [`MinerConfig::identity`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.chain.rpc_url.starts_with("ws://") {
            return Err(ConfigError::ValidationError(format!(
                "chain.rpc_url must be a ws:// URL, got {}",
                self.chain.rpc_url
            )));
        }

        for (name, secs) in [
            ("inclusion_timeout_secs", self.chain.inclusion_timeout_secs),
            ("health_interval_secs", self.chain.health_interval_secs),
            ("check_timeout_secs", self.chain.check_timeout_secs),
            ("request_timeout_secs", self.chain.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ValidationError(format!("chain.{} cannot be 0", name)));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::ValidationError(
                "metrics.port cannot be 0".to_string(),
            ));
        }

        if self.miner.service_port == 0 || self.miner.file_port == 0 {
            return Err(ConfigError::ValidationError(
                "miner ports cannot be 0".to_string(),
            ));
        }

        parse_service_ip(&self.miner.service_ip)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if let Some(income) = &self.miner.income_account {
            income.parse::<AccountId>().map_err(|e| {
                ConfigError::ValidationError(format!("miner.income_account: {}", e))
            })?;
        }

        if let Some(bad) = self.calls.iter().find(|name| name.split_once('.').is_none()) {
            return Err(ConfigError::ValidationError(format!(
                "call name {:?} is not Pallet.call",
                bad
            )));
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        rpc_url: Option<String>,
        inclusion_timeout_secs: Option<u64>,
        metrics_port: Option<u16>,
    ) -> Self {
        if let Some(url) = rpc_url {
            self.chain.rpc_url = url;
        }
        if let Some(secs) = inclusion_timeout_secs {
            self.chain.inclusion_timeout_secs = secs;
        }
        if let Some(port) = metrics_port {
            self.metrics.port = port;
        }
        self
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("SMINER_RPC_URL") {
            self.chain.rpc_url = url;
        }

        if let Ok(secret) = std::env::var("SMINER_SECRET") {
            self.miner.secret = secret;
        }

        if let Ok(income) = std::env::var("SMINER_INCOME_ACCOUNT") {
            self.miner.income_account = Some(income);
        }

        if let Ok(port) = std::env::var("SMINER_METRICS_PORT") {
            match port.parse() {
                Ok(port) => self.metrics.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid SMINER_METRICS_PORT"),
            }
        }

        self
    }

    /// Signing identity derived from the configured secret
    pub fn identity(&self) -> Result<SigningIdentity, ConfigError> {
        if self.miner.secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "miner.secret is required (or set SMINER_SECRET)".to_string(),
            ));
        }
        SigningIdentity::from_secret(&self.miner.secret, self.miner.key_scheme)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Arguments for the registration call
    pub fn register_request(&self) -> Result<RegisterRequest, ConfigError> {
        let income = self.miner.income_account.as_deref().ok_or_else(|| {
            ConfigError::ValidationError("miner.income_account is required to register".to_string())
        })?;
        let income_account = income
            .parse::<AccountId>()
            .map_err(|e| ConfigError::ValidationError(format!("miner.income_account: {}", e)))?;
        let service_ip = parse_service_ip(&self.miner.service_ip)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(RegisterRequest {
            income_account,
            service_ip,
            service_port: self.miner.service_port,
            file_port: self.miner.file_port,
            pledge_tokens: self.miner.pledge_tokens,
        })
    }

    pub fn chain_client_config(&self) -> ChainClientConfig {
        ChainClientConfig {
            inclusion_timeout: Duration::from_secs(self.chain.inclusion_timeout_secs),
            ss58_prefix: self.chain.ss58_prefix,
            calls: self.calls.clone(),
        }
    }

    pub fn health_settings(&self) -> HealthSettings {
        HealthSettings {
            interval: Duration::from_secs(self.chain.health_interval_secs),
            check_timeout: Duration::from_secs(self.chain.check_timeout_secs),
            require_peers: self.chain.require_peers,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.chain.request_timeout_secs)
    }

    /// Listen address of the Prometheus endpoint, if enabled
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics
            .enabled
            .then(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.metrics.port)))
    }
}

/// Metrics and monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Serve a Prometheus scrape endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics HTTP server port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

/// Node connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// WebSocket JSON-RPC endpoint of the ledger node
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// How long to wait for an in-block status
    #[serde(default = "default_inclusion_timeout")]
    pub inclusion_timeout_secs: u64,

    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Count a node without peers as unhealthy
    #[serde(default = "default_true")]
    pub require_peers: bool,

    /// Address format for logs and CLI output
    #[serde(default = "default_ss58_prefix")]
    pub ss58_prefix: u16,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            inclusion_timeout_secs: default_inclusion_timeout(),
            health_interval_secs: default_health_interval(),
            check_timeout_secs: default_check_timeout(),
            request_timeout_secs: default_request_timeout(),
            require_peers: default_true(),
            ss58_prefix: default_ss58_prefix(),
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_inclusion_timeout() -> u64 {
    DEFAULT_INCLUSION_TIMEOUT.as_secs()
}

fn default_health_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL.as_secs()
}

fn default_check_timeout() -> u64 {
    DEFAULT_CHECK_TIMEOUT.as_secs()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_ss58_prefix() -> u16 {
    DEFAULT_SS58_PREFIX
}

/// Miner identity and endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct MinerSettings {
    /// Secret URI: `0x` hex seed, or a mnemonic with optional
    /// `//hard` / `/soft` junctions and `///password`
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub key_scheme: KeyScheme,

    /// Hex public key of the account receiving income
    #[serde(default)]
    pub income_account: Option<String>,

    #[serde(default = "default_service_ip")]
    pub service_ip: String,

    #[serde(default = "default_service_port")]
    pub service_port: u32,

    #[serde(default = "default_file_port")]
    pub file_port: u32,

    /// Whole tokens pledged at registration
    #[serde(default = "default_pledge_tokens")]
    pub pledge_tokens: u64,
}

impl Default for MinerSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            key_scheme: KeyScheme::default(),
            income_account: None,
            service_ip: default_service_ip(),
            service_port: default_service_port(),
            file_port: default_file_port(),
            pledge_tokens: default_pledge_tokens(),
        }
    }
}

impl fmt::Debug for MinerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinerSettings")
            .field("secret", &if self.secret.is_empty() { "" } else { "<redacted>" })
            .field("key_scheme", &self.key_scheme)
            .field("income_account", &self.income_account)
            .field("service_ip", &self.service_ip)
            .field("service_port", &self.service_port)
            .field("file_port", &self.file_port)
            .field("pledge_tokens", &self.pledge_tokens)
            .finish()
    }
}

fn default_service_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_service_port() -> u32 {
    DEFAULT_SERVICE_PORT
}

fn default_file_port() -> u32 {
    DEFAULT_FILE_PORT
}

fn default_pledge_tokens() -> u64 {
    DEFAULT_PLEDGE_TOKENS
}
