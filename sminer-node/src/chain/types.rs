//! Chain Client Types
//!
//! Request and result types for the miner flows, plus the operation names
//! and timing constants the client is configured with.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sminer_core::{AccountId, CallArg, ChainError, MinerInfo, ProofPhase, Result, TOKEN_DECIMALS};

use super::watcher::Correlation;

/// Result of a matched registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinerRegistration {
    /// Account the chain registered
    pub account: AccountId,
    /// Staked amount in plancks
    pub staking: u128,
}

/// Outcome of [`MinerChainClient::ensure_registered`](super::MinerChainClient::ensure_registered)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrollment {
    /// The account already holds a peer id; nothing was submitted
    Existing(MinerInfo),
    /// A registration was submitted
    Submitted {
        correlation: Correlation<MinerRegistration>,
        /// Record read back after inclusion, if it could be read
        miner: Option<MinerInfo>,
    },
}

/// Segment assigned by the chain for an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentIntent {
    pub segment_id: u64,
    pub random: u32,
}

/// Arguments of the registration call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Account that receives mining income
    pub income_account: AccountId,
    pub service_ip: Ipv4Addr,
    pub service_port: u32,
    pub file_port: u32,
    /// Whole tokens; scaled by the token decimals on the wire
    pub pledge_tokens: u64,
}

impl RegisterRequest {
    /// Pledge in the chain's smallest unit
    pub fn pledge_plancks(&self) -> u128 {
        self.pledge_tokens as u128 * 10u128.pow(TOKEN_DECIMALS)
    }

    pub fn to_args(&self) -> Vec<CallArg> {
        vec![
            CallArg::MultiAddress(self.income_account),
            CallArg::U32(u32::from(self.service_ip)),
            CallArg::U32(self.service_port),
            CallArg::U32(self.file_port),
            CallArg::Compact(self.pledge_plancks()),
        ]
    }
}

/// Parse a dotted IPv4 address as the chain expects it
pub fn parse_service_ip(ip: &str) -> Result<Ipv4Addr> {
    ip.parse()
        .map_err(|_| ChainError::InvalidArgument(format!("invalid IPv4 address: {}", ip)))
}

/// Arguments of the segment intent call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub size_type: u8,
    pub submit_type: u8,
    /// Miner peer id; also the correlation key
    pub peer_id: u64,
    pub unsealed_cids: Vec<Vec<u8>>,
    pub hash: Vec<u8>,
    pub shard_hash: Vec<u8>,
}

impl IntentRequest {
    pub fn to_args(&self) -> Vec<CallArg> {
        vec![
            CallArg::U8(self.size_type),
            CallArg::U8(self.submit_type),
            CallArg::U64(self.peer_id),
            CallArg::BytesSeq(self.unsealed_cids.clone()),
            CallArg::Bytes(self.hash.clone()),
            CallArg::Bytes(self.shard_hash.clone()),
        ]
    }
}

/// Arguments of the post-proof segment intent call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentPostRequest {
    pub peer_id: u64,
    pub segment_id: u64,
    pub size_type: u8,
    pub submit_type: u8,
}

impl IntentPostRequest {
    pub fn to_args(&self) -> Vec<CallArg> {
        vec![
            CallArg::U64(self.segment_id),
            CallArg::U8(self.size_type),
            CallArg::U8(self.submit_type),
        ]
    }
}

/// Opaque proof material for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofPayload {
    /// Phases A and B: one proof and one content id
    Single { proof: Vec<u8>, cid: Vec<u8> },
    /// Phases C and D: proof list and sealed content ids
    Multi {
        proofs: Vec<Vec<u8>>,
        sealed_cids: Vec<Vec<u8>>,
    },
}

/// One proof submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofSubmission {
    pub phase: ProofPhase,
    pub peer_id: u64,
    pub segment_id: u64,
    pub payload: ProofPayload,
}

impl ProofSubmission {
    /// Check that the payload shape fits the phase
    pub fn validate(&self) -> Result<()> {
        let multi = matches!(self.phase, ProofPhase::C | ProofPhase::D);
        match (&self.payload, multi) {
            (ProofPayload::Single { .. }, false) | (ProofPayload::Multi { .. }, true) => Ok(()),
            _ => Err(ChainError::InvalidArgument(format!(
                "{} takes a {} proof payload",
                self.phase,
                if multi { "multi-item" } else { "single" }
            ))),
        }
    }

    pub fn to_args(&self) -> Vec<CallArg> {
        let mut args = vec![CallArg::U64(self.peer_id), CallArg::U64(self.segment_id)];
        match &self.payload {
            ProofPayload::Single { proof, cid } => {
                args.push(CallArg::Bytes(proof.clone()));
                args.push(CallArg::Bytes(cid.clone()));
            }
            ProofPayload::Multi {
                proofs,
                sealed_cids,
            } => {
                args.push(CallArg::BytesSeq(proofs.clone()));
                args.push(CallArg::BytesSeq(sealed_cids.clone()));
            }
        }
        args
    }
}

/// Operation names as `Pallet.call`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallNames {
    pub register: String,
    pub intent_submit: String,
    pub intent_submit_post: String,
    pub submit_to_vpa: String,
    pub submit_to_vpb: String,
    pub submit_to_vpc: String,
    pub submit_to_vpd: String,
}

impl Default for CallNames {
    fn default() -> Self {
        Self {
            register: "Sminer.regnstk".to_string(),
            intent_submit: "SegmentBook.intent_submit".to_string(),
            intent_submit_post: "SegmentBook.intent_submit_po_st".to_string(),
            submit_to_vpa: "SegmentBook.submit_to_vpa".to_string(),
            submit_to_vpb: "SegmentBook.submit_to_vpb".to_string(),
            submit_to_vpc: "SegmentBook.submit_to_vpc".to_string(),
            submit_to_vpd: "SegmentBook.submit_to_vpd".to_string(),
        }
    }
}

impl CallNames {
    /// Proof call for a phase
    pub fn proof(&self, phase: ProofPhase) -> &str {
        match phase {
            ProofPhase::A => &self.submit_to_vpa,
            ProofPhase::B => &self.submit_to_vpb,
            ProofPhase::C => &self.submit_to_vpc,
            ProofPhase::D => &self.submit_to_vpd,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [
            &self.register,
            &self.intent_submit,
            &self.intent_submit_post,
            &self.submit_to_vpa,
            &self.submit_to_vpb,
            &self.submit_to_vpc,
            &self.submit_to_vpd,
        ]
        .into_iter()
        .map(String::as_str)
    }
}

/// Client settings derived from the process configuration
#[derive(Debug, Clone)]
pub struct ChainClientConfig {
    pub inclusion_timeout: Duration,
    pub ss58_prefix: u16,
    pub calls: CallNames,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            inclusion_timeout: constants::DEFAULT_INCLUSION_TIMEOUT,
            ss58_prefix: sminer_core::DEFAULT_SS58_PREFIX,
            calls: CallNames::default(),
        }
    }
}

pub mod constants {
    use std::time::Duration;

    /// Consecutive failed health checks before the connection is replaced
    pub const MAX_HEALTH_CHECK_FAILURES: u8 = 2;

    /// Wait for an in-block status (three block times)
    pub const DEFAULT_INCLUSION_TIMEOUT: Duration = Duration::from_secs(15);

    /// Health monitor tick
    pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(25);

    /// Bound on a single liveness check
    pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Bound on a single JSON-RPC round trip
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub const DEFAULT_RPC_URL: &str = "ws://127.0.0.1:9944";

    /// Prometheus scrape port
    pub const DEFAULT_METRICS_PORT: u16 = 9090;

    pub const DEFAULT_SERVICE_PORT: u32 = 15001;
    pub const DEFAULT_FILE_PORT: u32 = 15002;
    pub const DEFAULT_PLEDGE_TOKENS: u64 = 2000;

    /// Process exit code when registration fails
    pub const EXIT_REGISTRATION_FAILED: i32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sminer_core::fixtures;
    use sminer_core::UnsignedCall;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            income_account: AccountId([0x11; 32]),
            service_ip: parse_service_ip("192.168.1.1").unwrap(),
            service_port: 15001,
            file_port: 15002,
            pledge_tokens: 2000,
        }
    }

    #[test]
    fn test_register_args() {
        let args = register_request().to_args();
        assert_eq!(args[1], CallArg::U32(0xc0a8_0101));
        assert_eq!(args[4], CallArg::Compact(2_000_000_000_000_000));

        let schema = fixtures::miner_schema();
        let call = UnsignedCall::new("Sminer.regnstk", args).encode(&schema).unwrap();
        assert_eq!(call.bytes[0], fixtures::SMINER_INDEX);
    }

    #[test]
    fn test_bad_ip_rejected() {
        assert!(matches!(
            parse_service_ip("192.168.1"),
            Err(ChainError::InvalidArgument(_))
        ));
        assert!(parse_service_ip("::1").is_err());
    }

    #[test]
    fn test_request_args_fit_schema() {
        let schema = fixtures::miner_schema();
        let calls = CallNames::default();

        let intent = IntentRequest {
            size_type: 1,
            submit_type: 1,
            peer_id: 7,
            unsealed_cids: vec![b"cid".to_vec()],
            hash: vec![1; 4],
            shard_hash: vec![2; 4],
        };
        UnsignedCall::new(calls.intent_submit.clone(), intent.to_args())
            .encode(&schema)
            .unwrap();

        let post = IntentPostRequest {
            peer_id: 7,
            segment_id: 3,
            size_type: 1,
            submit_type: 2,
        };
        UnsignedCall::new(calls.intent_submit_post.clone(), post.to_args())
            .encode(&schema)
            .unwrap();

        for phase in ProofPhase::ALL {
            let payload = match phase {
                ProofPhase::A | ProofPhase::B => ProofPayload::Single {
                    proof: vec![1],
                    cid: vec![2],
                },
                _ => ProofPayload::Multi {
                    proofs: vec![vec![1]],
                    sealed_cids: vec![vec![2]],
                },
            };
            let submission = ProofSubmission {
                phase,
                peer_id: 7,
                segment_id: 3,
                payload,
            };
            submission.validate().unwrap();
            UnsignedCall::new(calls.proof(phase), submission.to_args())
                .encode(&schema)
                .unwrap();
        }
    }

    #[test]
    fn test_proof_payload_must_fit_phase() {
        let submission = ProofSubmission {
            phase: ProofPhase::C,
            peer_id: 1,
            segment_id: 1,
            payload: ProofPayload::Single {
                proof: vec![],
                cid: vec![],
            },
        };
        assert!(matches!(
            submission.validate(),
            Err(ChainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_default_call_names() {
        let calls = CallNames::default();
        assert_eq!(calls.proof(ProofPhase::B), "SegmentBook.submit_to_vpb");
        assert_eq!(calls.iter().count(), 7);
    }
}
