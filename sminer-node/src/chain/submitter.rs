//! Generic submission pipeline
//!
//! Every flow is the same sequence under one connection guard: resolve the
//! account, encode and sign the call, submit, wait for inclusion, fetch and
//! correlate the block's events. Flows differ only in the call they build
//! and the event they look for.

use std::sync::Arc;
use std::time::Duration;

use sminer_core::{AccountId, ChainError, ChainEvent, Result, SignedEnvelope, SigningIdentity, UnsignedCall};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::account::resolve_account;
use super::connection::ConnectionManager;
use super::rpc::ChainRpc;
use super::watcher::{fetch_and_correlate, watch_inclusion, Correlation};
use crate::metrics::{outcome, record_inclusion, record_submission};

/// Signs and submits calls for one identity over the shared connection
pub struct Submitter<C> {
    connections: ConnectionManager<C>,
    identity: Arc<SigningIdentity>,
    inclusion_timeout: Duration,
}

impl<C: ChainRpc> Submitter<C> {
    pub fn new(connections: ConnectionManager<C>, identity: Arc<SigningIdentity>, inclusion_timeout: Duration) -> Self {
        Self {
            connections,
            identity,
            inclusion_timeout,
        }
    }

    /// Account every submission is signed for
    pub fn account(&self) -> AccountId {
        self.identity.account()
    }

    pub fn inclusion_timeout(&self) -> Duration {
        self.inclusion_timeout
    }

    /// Submit `call` and pick this submission's event out of its block
    ///
    /// Errors abort the attempt before or during inclusion, or when the
    /// block's event log cannot be fetched. A log that was fetched is always
    /// `Ok`, with the scan outcome carried by the [`Correlation`].
    pub async fn submit_and_correlate<T, F>(&self, call: UnsignedCall, matches: F) -> Result<Correlation<T>>
    where
        T: Send,
        F: FnMut(&ChainEvent) -> Option<T> + Send,
    {
        let operation = call.operation().to_string();
        let result = self.attempt(call, matches).await;

        match &result {
            Ok(correlation) => record_submission(&operation, correlation.outcome()),
            Err(e) => {
                warn!(op = %operation, error = %e, outcome_unknown = e.outcome_unknown(), "Submission failed");
                record_submission(&operation, outcome::ERROR);
            }
        }
        result
    }

    async fn attempt<T, F>(&self, call: UnsignedCall, matches: F) -> Result<Correlation<T>>
    where
        T: Send,
        F: FnMut(&ChainEvent) -> Option<T> + Send,
    {
        // held until the events are read, so flows never interleave nonces
        let connection = self.connections.acquire().await;
        let account = self.identity.account();

        let resolved = resolve_account(&*connection, &account).await?;
        let encoded = call.encode(&resolved.schema)?;
        let envelope = SignedEnvelope::sign(encoded, &self.identity, &resolved.state);

        info!(
            op = %envelope.operation(),
            nonce = envelope.nonce(),
            generation = connection.generation(),
            "Submitting extrinsic"
        );

        let started = Instant::now();
        let subscription = connection
            .submit_and_watch(&envelope.encode())
            .await
            .map_err(ChainError::into_submission_rejected)?;
        let block = watch_inclusion(subscription, self.inclusion_timeout).await?;
        record_inclusion(envelope.operation(), started.elapsed());

        info!(op = %envelope.operation(), block = %block, "Extrinsic in block");

        let correlation = fetch_and_correlate(&*connection, &resolved.schema, block, matches).await?;
        debug!(op = %envelope.operation(), outcome = correlation.outcome(), "Correlated block events");
        Ok(correlation)
    }
}
