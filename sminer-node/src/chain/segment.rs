//! Segment Intent Operations
//!
//! Announces a segment the miner is about to fill and receives the segment
//! id and random seed the chain assigns in its `ParamSet` event.

use std::sync::Arc;

use sminer_core::{ChainEvent, Result, UnsignedCall};
use tracing::{info, warn};

use super::rpc::ChainRpc;
use super::submitter::Submitter;
use super::types::{IntentPostRequest, IntentRequest, SegmentIntent};
use super::watcher::Correlation;

pub struct SegmentOps<C> {
    submitter: Arc<Submitter<C>>,
    intent_call: String,
    intent_post_call: String,
}

impl<C: ChainRpc> SegmentOps<C> {
    pub fn new(submitter: Arc<Submitter<C>>, intent_call: impl Into<String>, intent_post_call: impl Into<String>) -> Self {
        Self {
            submitter,
            intent_call: intent_call.into(),
            intent_post_call: intent_post_call.into(),
        }
    }

    /// Submit a segment intent; matched on `ParamSet` for our peer id
    pub async fn submit_intent(&self, request: &IntentRequest) -> Result<Correlation<SegmentIntent>> {
        let peer = request.peer_id;
        let call = UnsignedCall::new(self.intent_call.clone(), request.to_args());

        let correlation = self
            .submitter
            .submit_and_correlate(call, |event| match event {
                ChainEvent::SegmentParamSet {
                    peer_id,
                    segment_id,
                    random,
                } if *peer_id == peer => Some(SegmentIntent {
                    segment_id: *segment_id,
                    random: *random,
                }),
                _ => None,
            })
            .await?;

        match &correlation {
            Correlation::Matched { value, .. } => {
                info!(peer_id = peer, segment_id = value.segment_id, "Segment assigned")
            }
            other => warn!(peer_id = peer, outcome = other.outcome(), "Segment intent without assignment"),
        }
        Ok(correlation)
    }

    /// Submit a post-proof intent for an existing segment; yields the seed
    pub async fn submit_intent_post(&self, request: &IntentPostRequest) -> Result<Correlation<u32>> {
        let peer = request.peer_id;
        let call = UnsignedCall::new(self.intent_post_call.clone(), request.to_args());

        let correlation = self
            .submitter
            .submit_and_correlate(call, |event| match event {
                ChainEvent::SegmentParamSet { peer_id, random, .. } if *peer_id == peer => Some(*random),
                _ => None,
            })
            .await?;

        if !correlation.is_matched() {
            warn!(
                peer_id = peer,
                segment_id = request.segment_id,
                outcome = correlation.outcome(),
                "Post intent without seed"
            );
        }
        Ok(correlation)
    }
}
