//! Storage Miner Chain Client Library
//!
//! Provides the miner's connection to its ledger node:
//! - Configuration management
//! - Shared node connection with health monitoring and reconnects
//! - Registration, segment intents and proof submission flows
//! - Submission metrics with a Prometheus exporter

pub mod chain;
pub mod config;
pub mod metrics;

pub use chain::{
    ChainClientConfig, ConnectionManager, Correlation, HealthMonitor, MinerChainClient,
    WsConnector, WsRpcClient,
};
pub use config::{ChainSettings, ConfigError, MetricsSettings, MinerConfig, MinerSettings};
pub use metrics::{init_metrics, install_exporter};
