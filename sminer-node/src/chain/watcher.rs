//! Inclusion watching and event correlation
//!
//! After submission the status stream, the subscription's error channel and
//! a deadline are raced; the first to fire decides the attempt. Once a block
//! is known its event log is fetched and scanned for the record that belongs
//! to this submission.

use std::time::Duration;

use sminer_core::{
    decode_event_records, system_events_key, BlockHash, ChainError, ChainEvent, ChainSchema,
    EventRecord, Result,
};
use tracing::{debug, warn};

use super::rpc::{ChainRpc, StatusSubscription, TxStatus};
use crate::metrics::outcome;

/// Wait until the extrinsic is reported in a block
///
/// Interim pool statuses are skipped. The subscription is dropped, and with
/// it unsubscribed, on every exit path.
pub async fn watch_inclusion(mut subscription: StatusSubscription, timeout: Duration) -> Result<BlockHash> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            update = subscription.updates.recv() => match update {
                Some(TxStatus::InBlock(block)) => return Ok(block),
                Some(status) if status.is_rejection() => {
                    return Err(ChainError::SubmissionRejected(format!("pool status {:?}", status)));
                }
                Some(status) => debug!(status = ?status, "Extrinsic status"),
                None => {
                    return Err(ChainError::Transport("extrinsic status stream closed".into()));
                }
            },
            Some(e) = subscription.errors.recv() => return Err(e),
            _ = &mut deadline => return Err(ChainError::InclusionTimeout(timeout)),
        }
    }
}

/// Outcome of scanning an included block for this submission's event
///
/// Only `Matched` carries a value. The other two are not errors: the
/// extrinsic is in the block and its state change may have happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation<T> {
    Matched { block: BlockHash, value: T },
    NotFound { block: BlockHash },
    DecodeFailed { block: BlockHash, reason: String },
}

impl<T> Correlation<T> {
    pub fn block(&self) -> BlockHash {
        match self {
            Correlation::Matched { block, .. }
            | Correlation::NotFound { block }
            | Correlation::DecodeFailed { block, .. } => *block,
        }
    }

    pub fn matched(self) -> Option<T> {
        match self {
            Correlation::Matched { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Correlation::Matched { .. })
    }

    /// Metric label
    pub fn outcome(&self) -> &'static str {
        match self {
            Correlation::Matched { .. } => outcome::MATCHED,
            Correlation::NotFound { .. } => outcome::NOT_FOUND,
            Correlation::DecodeFailed { .. } => outcome::DECODE_FAILED,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Correlation<U> {
        match self {
            Correlation::Matched { block, value } => Correlation::Matched {
                block,
                value: f(value),
            },
            Correlation::NotFound { block } => Correlation::NotFound { block },
            Correlation::DecodeFailed { block, reason } => Correlation::DecodeFailed { block, reason },
        }
    }
}

/// First record for which `matches` yields a value
pub fn correlate<T>(
    block: BlockHash,
    records: &[EventRecord],
    mut matches: impl FnMut(&ChainEvent) -> Option<T>,
) -> Correlation<T> {
    records
        .iter()
        .find_map(|record| matches(&record.event))
        .map(|value| Correlation::Matched { block, value })
        .unwrap_or(Correlation::NotFound { block })
}

/// Fetch the event log of `block` and correlate it
///
/// Fetch failures are returned as errors. A log that was fetched but does
/// not decode is logged and reported as `DecodeFailed`.
pub async fn fetch_and_correlate<C, T>(
    rpc: &C,
    schema: &ChainSchema,
    block: BlockHash,
    matches: impl FnMut(&ChainEvent) -> Option<T>,
) -> Result<Correlation<T>>
where
    C: ChainRpc + ?Sized,
{
    let raw = rpc
        .storage(&system_events_key(), Some(block))
        .await
        .inspect_err(|e| warn!(block = %block, error = %e, "Failed to fetch block events"))?
        // an absent entry is an empty log
        .unwrap_or_default();

    let records = if raw.is_empty() {
        Ok(Vec::new())
    } else {
        decode_event_records(schema, &raw)
    };

    Ok(match records {
        Ok(records) => {
            debug!(block = %block, events = records.len(), "Decoded block events");
            correlate(block, &records, matches)
        }
        Err(e) => {
            warn!(block = %block, error = %e, "Failed to decode block events");
            Correlation::DecodeFailed {
                block,
                reason: e.to_string(),
            }
        }
    })
}
