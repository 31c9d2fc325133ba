//! Proof Submission Operations
//!
//! Submits the four verification phases of a segment. Phases A and B carry
//! a single proof and content id; C and D carry proof lists and sealed ids.

use std::sync::Arc;

use sminer_core::{ChainEvent, Result, UnsignedCall};
use tracing::{info, warn};

use super::rpc::ChainRpc;
use super::submitter::Submitter;
use super::types::{CallNames, ProofSubmission};
use super::watcher::Correlation;

pub struct ProofOps<C> {
    submitter: Arc<Submitter<C>>,
    calls: CallNames,
}

impl<C: ChainRpc> ProofOps<C> {
    pub fn new(submitter: Arc<Submitter<C>>, calls: CallNames) -> Self {
        Self { submitter, calls }
    }

    /// Submit one phase; matched on that phase's submitted event for our
    /// peer and segment
    pub async fn submit(&self, submission: &ProofSubmission) -> Result<Correlation<()>> {
        submission.validate()?;

        let (phase, peer, segment) = (submission.phase, submission.peer_id, submission.segment_id);
        let call = UnsignedCall::new(self.calls.proof(phase), submission.to_args());

        let correlation = self
            .submitter
            .submit_and_correlate(call, |event| match event {
                ChainEvent::ProofSubmitted {
                    phase: p,
                    peer_id,
                    segment_id,
                } if *p == phase && *peer_id == peer && *segment_id == segment => Some(()),
                _ => None,
            })
            .await?;

        if correlation.is_matched() {
            info!(phase = %phase, peer_id = peer, segment_id = segment, "Proof accepted");
        } else {
            warn!(
                phase = %phase,
                peer_id = peer,
                segment_id = segment,
                outcome = correlation.outcome(),
                "Proof included without submitted event"
            );
        }
        Ok(correlation)
    }
}
