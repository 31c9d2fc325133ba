//! Remote node RPC surface
//!
//! [`ChainRpc`] is the seam between the engine and a live node session.
//! The WebSocket JSON-RPC client implements it for production; tests use a
//! scripted in-memory node.

use async_trait::async_trait;
use serde::Deserialize;
use sminer_core::{BlockHash, ChainError, Result};
use tokio::sync::mpsc;

/// `system_health` result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub peers: u64,
    pub is_syncing: bool,
    #[serde(default)]
    pub should_have_peers: bool,
}

/// Runtime versions bound into every signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    pub spec_version: u32,
    pub transaction_version: u32,
}

/// Transaction pool status of a watched extrinsic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Future,
    Ready,
    Broadcast(Vec<String>),
    InBlock(BlockHash),
    Retracted(BlockHash),
    FinalityTimeout(BlockHash),
    Finalized(BlockHash),
    Usurped(String),
    Dropped,
    Invalid,
}

impl TxStatus {
    /// Parse an `author_extrinsicUpdate` payload
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let malformed = || ChainError::Codec(format!("unrecognized extrinsic status {}", value));

        if let Some(s) = value.as_str() {
            return match s {
                "future" => Ok(TxStatus::Future),
                "ready" => Ok(TxStatus::Ready),
                "dropped" => Ok(TxStatus::Dropped),
                "invalid" => Ok(TxStatus::Invalid),
                _ => Err(malformed()),
            };
        }

        let object = value.as_object().ok_or_else(malformed)?;
        let (key, inner) = object.iter().next().ok_or_else(malformed)?;
        let hash = || -> Result<BlockHash> { inner.as_str().ok_or_else(malformed)?.parse() };

        match key.as_str() {
            "broadcast" => {
                let peers = inner
                    .as_array()
                    .ok_or_else(malformed)?
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect();
                Ok(TxStatus::Broadcast(peers))
            }
            "inBlock" => Ok(TxStatus::InBlock(hash()?)),
            "retracted" => Ok(TxStatus::Retracted(hash()?)),
            "finalityTimeout" => Ok(TxStatus::FinalityTimeout(hash()?)),
            "finalized" => Ok(TxStatus::Finalized(hash()?)),
            "usurped" => Ok(TxStatus::Usurped(
                inner.as_str().ok_or_else(malformed)?.to_string(),
            )),
            _ => Err(malformed()),
        }
    }

    /// Whether the pool has given up on the transaction
    pub fn is_rejection(&self) -> bool {
        matches!(self, TxStatus::Dropped | TxStatus::Invalid | TxStatus::Usurped(_))
    }
}

/// Live status stream of a submitted extrinsic
///
/// `updates` carries pool statuses, `errors` carries out-of-band failures
/// of the subscription itself. Dropping the subscription unsubscribes.
pub struct StatusSubscription {
    pub updates: mpsc::Receiver<TxStatus>,
    pub errors: mpsc::Receiver<ChainError>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl StatusSubscription {
    pub fn new(
        updates: mpsc::Receiver<TxStatus>,
        errors: mpsc::Receiver<ChainError>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            updates,
            errors,
            on_drop: Some(Box::new(on_drop)),
        }
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.on_drop.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for StatusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSubscription").finish_non_exhaustive()
    }
}

/// One session with a remote ledger node
#[async_trait]
pub trait ChainRpc: Send + Sync + 'static {
    /// Peer count and sync state
    async fn system_health(&self) -> Result<NodeHealth>;

    /// SCALE-encoded runtime metadata at the best block
    async fn metadata(&self) -> Result<Vec<u8>>;

    /// Hash of block 0
    async fn genesis_hash(&self) -> Result<BlockHash>;

    async fn runtime_version(&self) -> Result<RuntimeVersion>;

    /// Raw storage value, `None` when the entry is empty
    async fn storage(&self, key: &[u8], at: Option<BlockHash>) -> Result<Option<Vec<u8>>>;

    /// Submit an encoded extrinsic and watch its pool status
    async fn submit_and_watch(&self, extrinsic: &[u8]) -> Result<StatusSubscription>;
}
