//! Scripted in-memory node for engine tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sminer_core::fixtures;
use sminer_core::storage::{storage_prefix, MINER_ITEMS};
use sminer_core::{
    system_account_key, system_events_key, AccountId, BlockHash, ChainError, ExtrinsicHeader,
    Result,
};
use tokio::sync::mpsc;

use super::connection::Connector;
use super::rpc::{ChainRpc, NodeHealth, RuntimeVersion, StatusSubscription, TxStatus};

pub const SPEC_VERSION: u32 = 100;
pub const TX_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub enum HealthScript {
    Peers(u64),
    Fail,
    Panic,
    Hang,
}

#[derive(Debug, Clone)]
pub enum StatusScript {
    /// `ready` then `inBlock`
    Include,
    /// `ready` and nothing else, stream stays open
    Hang,
    /// `ready` then the given status
    Reject(TxStatus),
    /// Stream closes without a status
    Close,
    /// Error on the subscription's error channel
    SubscriptionError(ChainError),
    /// Submission itself fails
    SubmitError(ChainError),
}

type EventsFn = dyn Fn(&ExtrinsicHeader, usize) -> Vec<u8> + Send + Sync;

#[derive(Debug, Clone)]
pub struct Submitted {
    pub header: ExtrinsicHeader,
    pub block: BlockHash,
}

pub struct MockChainRpc {
    id: u64,
    metadata: Vec<u8>,
    health: Mutex<HealthScript>,
    status: Mutex<StatusScript>,
    nonces: Mutex<HashMap<AccountId, u32>>,
    miners: Mutex<HashMap<AccountId, u64>>,
    register_on_submit: Mutex<Option<u64>>,
    events: Mutex<Arc<EventsFn>>,
    logs: Mutex<HashMap<BlockHash, Vec<u8>>>,
    fail_event_fetch: AtomicBool,
    submitted: Mutex<Vec<Submitted>>,
    calls: Mutex<Vec<&'static str>>,
    health_checks: AtomicUsize,
    unwatched: Arc<AtomicUsize>,
    held: Mutex<Vec<(mpsc::Sender<TxStatus>, mpsc::Sender<ChainError>)>>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        Self::with_id(0)
    }

    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            metadata: fixtures::encode_metadata(&fixtures::miner_schema()),
            health: Mutex::new(HealthScript::Peers(3)),
            status: Mutex::new(StatusScript::Include),
            nonces: Mutex::new(HashMap::new()),
            miners: Mutex::new(HashMap::new()),
            register_on_submit: Mutex::new(None),
            events: Mutex::new(Arc::new(|_: &ExtrinsicHeader, _: usize| {
                fixtures::EventLogBuilder::new().extrinsic_success(0).build()
            })),
            logs: Mutex::new(HashMap::new()),
            fail_event_fetch: AtomicBool::new(false),
            submitted: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            health_checks: AtomicUsize::new(0),
            unwatched: Arc::new(AtomicUsize::new(0)),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn with_account(self, account: AccountId, nonce: u32) -> Self {
        self.nonces.lock().unwrap().insert(account, nonce);
        self
    }

    /// Store a `Sminer.MinerItems` record for `account`
    pub fn with_miner(self, account: AccountId, peer_id: u64) -> Self {
        self.miners.lock().unwrap().insert(account, peer_id);
        self
    }

    /// Record every later signer as a miner with `peer_id`
    pub fn register_on_submit(&self, peer_id: u64) {
        *self.register_on_submit.lock().unwrap() = Some(peer_id);
    }

    /// Event log served for `block`
    pub fn set_block_log(&self, block: BlockHash, raw: Vec<u8>) {
        self.logs.lock().unwrap().insert(block, raw);
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_health(&self, script: HealthScript) {
        *self.health.lock().unwrap() = script;
    }

    pub fn set_status(&self, script: StatusScript) {
        *self.status.lock().unwrap() = script;
    }

    /// Event log of the block that includes the `n`th submission
    pub fn set_events(&self, f: impl Fn(&ExtrinsicHeader, usize) -> Vec<u8> + Send + Sync + 'static) {
        *self.events.lock().unwrap() = Arc::new(f);
    }

    pub fn fail_event_fetch(&self) {
        self.fail_event_fetch.store(true, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_nonces(&self) -> Vec<u64> {
        self.submitted().iter().map(|s| s.header.nonce).collect()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn unwatched(&self) -> usize {
        self.unwatched.load(Ordering::SeqCst)
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

fn block_for(index: usize) -> BlockHash {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&(index as u64 + 1).to_le_bytes());
    BlockHash(hash)
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn system_health(&self) -> Result<NodeHealth> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        let script = self.health.lock().unwrap().clone();
        match script {
            HealthScript::Peers(peers) => Ok(NodeHealth {
                peers,
                is_syncing: false,
                should_have_peers: true,
            }),
            HealthScript::Fail => Err(ChainError::Transport("health check failed".into())),
            HealthScript::Panic => panic!("health check exploded"),
            HealthScript::Hang => std::future::pending().await,
        }
    }

    async fn metadata(&self) -> Result<Vec<u8>> {
        self.log("metadata");
        Ok(self.metadata.clone())
    }

    async fn genesis_hash(&self) -> Result<BlockHash> {
        self.log("genesis_hash");
        Ok(BlockHash([0xee; 32]))
    }

    async fn runtime_version(&self) -> Result<RuntimeVersion> {
        self.log("runtime_version");
        Ok(RuntimeVersion {
            spec_version: SPEC_VERSION,
            transaction_version: TX_VERSION,
        })
    }

    async fn storage(&self, key: &[u8], at: Option<BlockHash>) -> Result<Option<Vec<u8>>> {
        if key == system_events_key().as_slice() {
            self.log("events");
            if self.fail_event_fetch.load(Ordering::SeqCst) {
                return Err(ChainError::Transport("event log unavailable".into()));
            }
            return Ok(at.and_then(|block| self.logs.lock().unwrap().get(&block).cloned()));
        }

        if key.starts_with(&storage_prefix("Sminer", MINER_ITEMS)) {
            self.log("miner");
            let schema = fixtures::miner_schema();
            let miners = self.miners.lock().unwrap();
            return Ok(miners
                .iter()
                .find(|(account, _)| {
                    sminer_core::miner_items_key(&schema, account).is_ok_and(|k| k == key)
                })
                .map(|(account, peer_id)| fixtures::encode_miner_info(*peer_id, *account, 4_000)));
        }

        self.log("account");
        let nonces = self.nonces.lock().unwrap();
        Ok(nonces
            .iter()
            .find(|(account, _)| key == system_account_key(account).as_slice())
            .map(|(_, nonce)| fixtures::encode_account_info(*nonce, 1_000_000_000_000_000)))
    }

    async fn submit_and_watch(&self, extrinsic: &[u8]) -> Result<StatusSubscription> {
        self.log("submit");
        let script = self.status.lock().unwrap().clone();
        if let StatusScript::SubmitError(e) = script {
            return Err(e);
        }

        let header = ExtrinsicHeader::decode(extrinsic)?;
        {
            let mut nonces = self.nonces.lock().unwrap();
            let expected = nonces.get_mut(&header.signer).ok_or_else(|| ChainError::Rpc {
                code: 1010,
                message: "Invalid Transaction: unknown account".into(),
            })?;
            if header.nonce != *expected as u64 {
                return Err(ChainError::Rpc {
                    code: 1010,
                    message: "Invalid Transaction: stale nonce".into(),
                });
            }
            *expected += 1;
        }

        let block = {
            let mut submitted = self.submitted.lock().unwrap();
            let index = submitted.len();
            let block = block_for(index);
            let events = self.events.lock().unwrap().clone();
            self.logs.lock().unwrap().insert(block, events(&header, index));
            if let Some(peer_id) = *self.register_on_submit.lock().unwrap() {
                self.miners.lock().unwrap().insert(header.signer, peer_id);
            }
            submitted.push(Submitted {
                header,
                block,
            });
            block
        };

        let (updates_tx, updates) = mpsc::channel(8);
        let (errors_tx, errors) = mpsc::channel(1);
        let _ = updates_tx.try_send(TxStatus::Ready);
        match script {
            StatusScript::Include => {
                let _ = updates_tx.try_send(TxStatus::InBlock(block));
            }
            StatusScript::Hang => self.held.lock().unwrap().push((updates_tx, errors_tx)),
            StatusScript::Reject(status) => {
                let _ = updates_tx.try_send(status);
            }
            StatusScript::Close => {
                let (closed_tx, closed) = mpsc::channel(1);
                drop(closed_tx);
                let unwatched = Arc::clone(&self.unwatched);
                return Ok(StatusSubscription::new(closed, errors, move || {
                    unwatched.fetch_add(1, Ordering::SeqCst);
                }));
            }
            StatusScript::SubscriptionError(e) => {
                let _ = errors_tx.try_send(e);
                self.held.lock().unwrap().push((updates_tx, errors_tx));
            }
            StatusScript::SubmitError(_) => unreachable!(),
        }

        let unwatched = Arc::clone(&self.unwatched);
        Ok(StatusSubscription::new(updates, errors, move || {
            unwatched.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// Connector handing out fresh mock nodes with increasing ids
pub struct MockConnector {
    attempts: AtomicU64,
    fail: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector<MockChainRpc> for Arc<MockConnector> {
    async fn connect(&self) -> Result<MockChainRpc> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChainError::Transport("connection refused".into()));
        }
        Ok(MockChainRpc::with_id(100 + attempt))
    }
}
