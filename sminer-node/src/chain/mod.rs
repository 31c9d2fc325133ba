//! Storage Miner Chain Integration
//!
//! This module connects the miner to its ledger node:
//! - One shared node connection, replaced by a supervisor task on failure
//! - A health monitor that checks the node and reconnects
//! - Registration, segment intents and the four proof phases
//!
//! # Architecture
//!
//! Every flow runs the same pipeline under the exclusive connection guard:
//! resolve account state, encode and sign the call, submit and watch for
//! inclusion, then fetch the block's events and correlate them with the
//! submission. Flows differ only in the call and the event they look for.
//!
//! # Example
//!
//! ```rust,ignore
//! use sminer_node::chain::{ConnectionManager, MinerChainClient, WsConnector, Connector};
//!
//! let connector = WsConnector { url, request_timeout };
//! let connections = ConnectionManager::start(connector.connect().await?);
//! let client = MinerChainClient::new(connections, identity, ChainClientConfig::default());
//!
//! if let Some(registration) = client.register(&request).await?.matched() {
//!     println!("registered {}", registration.account);
//! }
//! ```

mod account;
mod client;
pub mod connection;
pub mod health;
#[cfg(test)]
pub(crate) mod mock;
mod proofs;
mod registration;
pub mod rpc;
mod segment;
mod submitter;
mod types;
mod watcher;
pub mod ws;

// Re-export main client
pub use client::MinerChainClient;

// Re-export pipeline pieces
pub use account::{read_miner_info, resolve_account, ResolvedState};
pub use connection::{ConnectionGuard, ConnectionManager, Connector, Replacer};
pub use health::{HealthMonitor, HealthSettings, TickOutcome};
pub use rpc::{ChainRpc, NodeHealth, RuntimeVersion, StatusSubscription, TxStatus};
pub use submitter::Submitter;
pub use watcher::{correlate, fetch_and_correlate, watch_inclusion, Correlation};
pub use ws::{WsConnector, WsRpcClient};

// Re-export types
pub use types::{
    parse_service_ip, CallNames, ChainClientConfig, Enrollment, IntentPostRequest, IntentRequest,
    MinerRegistration, ProofPayload, ProofSubmission, RegisterRequest, SegmentIntent,
};

// Re-export operations for advanced use
pub use proofs::ProofOps;
pub use registration::RegistrationOps;
pub use segment::SegmentOps;

// Re-export constants
pub use types::constants;
