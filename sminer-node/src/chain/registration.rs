//! Miner Registration Operations
//!
//! Registers the signing account as a storage miner, pledging stake and
//! announcing the service endpoint.

use std::sync::Arc;

use sminer_core::{ChainEvent, Result, UnsignedCall};
use tracing::{info, warn};

use super::rpc::ChainRpc;
use super::submitter::Submitter;
use super::types::{MinerRegistration, RegisterRequest};
use super::watcher::Correlation;

/// Registration operations for the miner account
pub struct RegistrationOps<C> {
    submitter: Arc<Submitter<C>>,
    call: String,
}

impl<C: ChainRpc> RegistrationOps<C> {
    pub fn new(submitter: Arc<Submitter<C>>, call: impl Into<String>) -> Self {
        Self {
            submitter,
            call: call.into(),
        }
    }

    /// Register the miner; matched on `Registered` for our own account
    pub async fn register(&self, request: &RegisterRequest) -> Result<Correlation<MinerRegistration>> {
        let own = self.submitter.account();
        let call = UnsignedCall::new(self.call.clone(), request.to_args());

        let correlation = self
            .submitter
            .submit_and_correlate(call, |event| match event {
                ChainEvent::Registered { account, staking } if *account == own => Some(MinerRegistration {
                    account: *account,
                    staking: *staking,
                }),
                _ => None,
            })
            .await?;

        match &correlation {
            Correlation::Matched { value, block } => info!(
                account = %value.account,
                staking = value.staking,
                block = %block,
                "Miner registered"
            ),
            Correlation::NotFound { block } => {
                warn!(block = %block, "Registration included without a Registered event")
            }
            Correlation::DecodeFailed { block, reason } => {
                warn!(block = %block, reason = %reason, "Registration included, events unreadable")
            }
        }
        Ok(correlation)
    }
}
