//! Error types for the miner chain client
//!
//! Provides a unified error type for every chain interaction: transport,
//! schema, account resolution, signing, submission and inclusion.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Unified error type for chain interaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    // ===== Transport Errors =====
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    // ===== Resolution Errors =====
    #[error("Schema fetch error: {0}")]
    SchemaFetch(String),

    #[error("Storage fetch error: {0}")]
    StorageFetch(String),

    #[error("Account not found on chain: {0}")]
    AccountNotFound(String),

    // ===== Build / Sign Errors =====
    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Unknown call: {0}")]
    UnknownCall(String),

    #[error("Call encoding error for {call}: {reason}")]
    CallEncoding { call: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ===== Submission Errors =====
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("No inclusion within {0:?}")]
    InclusionTimeout(Duration),

    // ===== Codec Errors =====
    #[error("Codec error: {0}")]
    Codec(String),
}

impl ChainError {
    /// Re-classify a node-side failure as a schema fetch failure.
    ///
    /// Transport failures are kept as they are so callers can tell an
    /// unreachable node apart from a node that answered with an error.
    pub fn into_schema_fetch(self) -> Self {
        match self {
            ChainError::Transport(_) => self,
            other => ChainError::SchemaFetch(other.to_string()),
        }
    }

    /// Re-classify a node-side failure as a storage fetch failure.
    pub fn into_storage_fetch(self) -> Self {
        match self {
            ChainError::Transport(_) => self,
            other => ChainError::StorageFetch(other.to_string()),
        }
    }

    /// Re-classify a node-side failure as a rejected submission.
    pub fn into_submission_rejected(self) -> Self {
        match self {
            ChainError::Rpc { code, message } => {
                ChainError::SubmissionRejected(format!("{} ({})", message, code))
            }
            other => other,
        }
    }

    /// Whether the node may already have applied the state change.
    ///
    /// Only a timeout leaves the outcome unknown; every other error is
    /// raised before the transaction reached the pool or after the node
    /// refused it.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, ChainError::InclusionTimeout(_))
    }
}

impl From<parity_scale_codec::Error> for ChainError {
    fn from(e: parity_scale_codec::Error) -> Self {
        ChainError::Codec(e.to_string())
    }
}
