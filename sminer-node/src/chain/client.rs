//! Miner Chain Client
//!
//! Main client for the storage miner to interact with the chain.

use std::sync::Arc;

use sminer_core::{AccountId, AccountState, MinerInfo, ProofPhase, Result, SigningIdentity};
use tracing::{info, warn};

use super::account::{read_miner_info, resolve_account};
use super::connection::ConnectionManager;
use super::proofs::ProofOps;
use super::registration::RegistrationOps;
use super::rpc::{ChainRpc, NodeHealth};
use super::segment::SegmentOps;
use super::submitter::Submitter;
use super::types::{
    ChainClientConfig, Enrollment, IntentPostRequest, IntentRequest, MinerRegistration, ProofPayload,
    ProofSubmission, RegisterRequest, SegmentIntent,
};
use super::watcher::Correlation;

/// Main chain client for the storage miner
pub struct MinerChainClient<C> {
    /// Shared node connection
    connections: ConnectionManager<C>,

    /// Configuration
    config: ChainClientConfig,

    /// Registration operations
    registration: RegistrationOps<C>,

    /// Segment intent operations
    segments: SegmentOps<C>,

    /// Proof submission operations
    proofs: ProofOps<C>,

    account: AccountId,
}

impl<C: ChainRpc> MinerChainClient<C> {
    pub fn new(connections: ConnectionManager<C>, identity: SigningIdentity, config: ChainClientConfig) -> Self {
        let account = identity.account();
        let submitter = Arc::new(Submitter::new(
            connections.clone(),
            Arc::new(identity),
            config.inclusion_timeout,
        ));

        let registration = RegistrationOps::new(Arc::clone(&submitter), config.calls.register.clone());
        let segments = SegmentOps::new(
            Arc::clone(&submitter),
            config.calls.intent_submit.clone(),
            config.calls.intent_submit_post.clone(),
        );
        let proofs = ProofOps::new(submitter, config.calls.clone());

        info!(
            account = %account.to_ss58(config.ss58_prefix),
            inclusion_timeout_secs = config.inclusion_timeout.as_secs(),
            "Miner chain client initialized"
        );

        Self {
            connections,
            config,
            registration,
            segments,
            proofs,
            account,
        }
    }

    /// Account every extrinsic is signed for
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// SS58 rendering of the signing account
    pub fn account_ss58(&self) -> String {
        self.account.to_ss58(self.config.ss58_prefix)
    }

    pub fn config(&self) -> &ChainClientConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Liveness of the current node
    pub async fn node_health(&self) -> Result<NodeHealth> {
        self.connections.acquire().await.system_health().await
    }

    /// Fresh nonce and runtime versions of the signing account
    pub async fn account_state(&self) -> Result<AccountState> {
        let connection = self.connections.acquire().await;
        Ok(resolve_account(&*connection, &self.account).await?.state)
    }

    /// The signing account's `Sminer.MinerItems` record
    pub async fn miner_info(&self) -> Result<Option<MinerInfo>> {
        let connection = self.connections.acquire().await;
        read_miner_info(&*connection, &self.account).await
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    pub async fn register(&self, request: &RegisterRequest) -> Result<Correlation<MinerRegistration>> {
        self.registration.register(request).await
    }

    /// Register unless the account already holds a peer id
    ///
    /// After a submission the record is read back so the caller can report
    /// the assigned peer id. A failed read-back is logged, not returned.
    pub async fn ensure_registered(&self, request: &RegisterRequest) -> Result<Enrollment> {
        if let Some(miner) = self.miner_info().await?.filter(MinerInfo::is_registered) {
            info!(peer_id = miner.peer_id, "Miner already registered");
            return Ok(Enrollment::Existing(miner));
        }

        let correlation = self.register(request).await?;
        let miner = match self.miner_info().await {
            Ok(miner) => miner,
            Err(e) => {
                warn!(error = %e, "Failed to read miner record after registration");
                None
            }
        };
        Ok(Enrollment::Submitted { correlation, miner })
    }

    // =========================================================================
    // SEGMENT INTENTS
    // =========================================================================

    pub async fn submit_intent(&self, request: &IntentRequest) -> Result<Correlation<SegmentIntent>> {
        self.segments.submit_intent(request).await
    }

    pub async fn submit_intent_post(&self, request: &IntentPostRequest) -> Result<Correlation<u32>> {
        self.segments.submit_intent_post(request).await
    }

    // =========================================================================
    // PROOFS
    // =========================================================================

    pub async fn submit_proof(&self, submission: &ProofSubmission) -> Result<Correlation<()>> {
        self.proofs.submit(submission).await
    }

    pub async fn submit_to_vpa(&self, peer_id: u64, segment_id: u64, proof: Vec<u8>, cid: Vec<u8>) -> Result<Correlation<()>> {
        self.submit_single(ProofPhase::A, peer_id, segment_id, proof, cid).await
    }

    pub async fn submit_to_vpb(&self, peer_id: u64, segment_id: u64, proof: Vec<u8>, cid: Vec<u8>) -> Result<Correlation<()>> {
        self.submit_single(ProofPhase::B, peer_id, segment_id, proof, cid).await
    }

    pub async fn submit_to_vpc(
        &self,
        peer_id: u64,
        segment_id: u64,
        proofs: Vec<Vec<u8>>,
        sealed_cids: Vec<Vec<u8>>,
    ) -> Result<Correlation<()>> {
        self.submit_multi(ProofPhase::C, peer_id, segment_id, proofs, sealed_cids).await
    }

    pub async fn submit_to_vpd(
        &self,
        peer_id: u64,
        segment_id: u64,
        proofs: Vec<Vec<u8>>,
        sealed_cids: Vec<Vec<u8>>,
    ) -> Result<Correlation<()>> {
        self.submit_multi(ProofPhase::D, peer_id, segment_id, proofs, sealed_cids).await
    }

    async fn submit_single(
        &self,
        phase: ProofPhase,
        peer_id: u64,
        segment_id: u64,
        proof: Vec<u8>,
        cid: Vec<u8>,
    ) -> Result<Correlation<()>> {
        self.proofs
            .submit(&ProofSubmission {
                phase,
                peer_id,
                segment_id,
                payload: ProofPayload::Single { proof, cid },
            })
            .await
    }

    async fn submit_multi(
        &self,
        phase: ProofPhase,
        peer_id: u64,
        segment_id: u64,
        proofs: Vec<Vec<u8>>,
        sealed_cids: Vec<Vec<u8>>,
    ) -> Result<Correlation<()>> {
        self.proofs
            .submit(&ProofSubmission {
                phase,
                peer_id,
                segment_id,
                payload: ProofPayload::Multi { proofs, sealed_cids },
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{HealthScript, MockChainRpc};
    use crate::chain::types::parse_service_ip;
    use sminer_core::fixtures::EventLogBuilder;
    use sminer_core::KeyScheme;

    fn identity() -> SigningIdentity {
        SigningIdentity::from_secret("0x0101010101010101010101010101010101010101010101010101010101010101", KeyScheme::Sr25519).unwrap()
    }

    fn client_with(setup: impl FnOnce(MockChainRpc, AccountId) -> MockChainRpc) -> MinerChainClient<MockChainRpc> {
        let identity = identity();
        let node = setup(MockChainRpc::new().with_account(identity.account(), 0), identity.account());
        MinerChainClient::new(ConnectionManager::start(node), identity, ChainClientConfig::default())
    }

    fn client() -> MinerChainClient<MockChainRpc> {
        client_with(|node, _| node)
    }

    fn register_request(account: AccountId) -> RegisterRequest {
        RegisterRequest {
            income_account: account,
            service_ip: parse_service_ip("10.0.0.2").unwrap(),
            service_port: 15001,
            file_port: 15002,
            pledge_tokens: 2000,
        }
    }

    #[tokio::test]
    async fn test_full_miner_cycle() {
        let client = client();
        let account = client.account();
        client.connections().current().await.set_events(move |header, n| {
            let log = EventLogBuilder::new();
            let log = match n {
                0 => log.registered(0, header.signer, 2_000_000_000_000_000),
                1 => log.param_set(0, 7, 55, 9),
                2 => log.proof_submitted(0, ProofPhase::A, 7, 55),
                3 => log.proof_submitted(0, ProofPhase::B, 7, 55),
                4 => log.proof_submitted(0, ProofPhase::C, 7, 55),
                _ => log.proof_submitted(0, ProofPhase::D, 7, 55),
            };
            log.extrinsic_success(0).build()
        });

        let registration = client
            .register(&register_request(account))
            .await
            .unwrap()
            .matched()
            .unwrap();
        assert_eq!(registration.account, account);

        let segment = client
            .submit_intent(&IntentRequest {
                size_type: 1,
                submit_type: 1,
                peer_id: 7,
                unsealed_cids: vec![b"cid".to_vec()],
                hash: vec![1; 32],
                shard_hash: vec![2; 32],
            })
            .await
            .unwrap()
            .matched()
            .unwrap();
        assert_eq!(segment.segment_id, 55);

        assert!(client.submit_to_vpa(7, 55, vec![1], vec![2]).await.unwrap().is_matched());
        assert!(client.submit_to_vpb(7, 55, vec![1], vec![2]).await.unwrap().is_matched());
        assert!(client
            .submit_to_vpc(7, 55, vec![vec![1]], vec![vec![2]])
            .await
            .unwrap()
            .is_matched());
        assert!(client
            .submit_to_vpd(7, 55, vec![vec![1]], vec![vec![2]])
            .await
            .unwrap()
            .is_matched());

        assert_eq!(client.account_state().await.unwrap().nonce, 6);
    }

    #[tokio::test]
    async fn test_already_registered_skips_submission() {
        let client = client_with(|node, account| node.with_miner(account, 9));

        let enrollment = client.ensure_registered(&register_request(client.account())).await.unwrap();
        match enrollment {
            Enrollment::Existing(miner) => assert_eq!(miner.peer_id, 9),
            other => panic!("expected an existing record, got {:?}", other),
        }
        assert!(client.connections().current().await.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_registration_reports_assigned_peer_id() {
        let client = client();
        let node = client.connections().current().await;
        node.register_on_submit(21);
        node.set_events(|header, _| {
            EventLogBuilder::new()
                .registered(0, header.signer, 2_000_000_000_000_000)
                .extrinsic_success(0)
                .build()
        });
        assert_eq!(client.miner_info().await.unwrap(), None);

        let enrollment = client.ensure_registered(&register_request(client.account())).await.unwrap();
        let Enrollment::Submitted { correlation, miner } = enrollment else {
            panic!("expected a submission");
        };
        assert!(correlation.is_matched());
        assert_eq!(miner.map(|m| m.peer_id), Some(21));
        assert_eq!(node.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_node_health_passthrough() {
        let client = client();
        client.connections().current().await.set_health(HealthScript::Peers(12));
        assert_eq!(client.node_health().await.unwrap().peers, 12);
        assert!(client.account_ss58().starts_with('5'));
    }
}
