//! Shared node connection
//!
//! Exactly one connection is current at any time. Flows take exclusive
//! access through [`ConnectionManager::acquire`] and hold it for a whole
//! submission attempt, which serializes nonce resolution, signing and
//! submission across flows.
//!
//! The slot is replaced, never mutated, and only by the supervisor task.
//! Anything that wants to swap the connection (the health monitor) sends a
//! request through a [`Replacer`] and waits for the acknowledgement.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sminer_core::{ChainError, Result};
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::metrics::record_reconnect;

/// Opens fresh sessions of type `C`
#[async_trait]
pub trait Connector<C>: Send + Sync + 'static {
    async fn connect(&self) -> Result<C>;
}

struct ReplaceRequest<C> {
    connection: Arc<C>,
    ack: oneshot::Sender<u64>,
}

/// Exclusive access to the current connection; released on drop
pub struct ConnectionGuard<C> {
    guard: OwnedMutexGuard<Arc<C>>,
    generation: u64,
}

impl<C> ConnectionGuard<C> {
    /// Generation of the connection this guard holds
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<C> Deref for ConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &**self.guard
    }
}

/// Handle for requesting a connection swap
pub struct Replacer<C> {
    tx: mpsc::Sender<ReplaceRequest<C>>,
}

impl<C> Clone for Replacer<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> Replacer<C> {
    /// Install `connection` as current; returns the new generation
    pub async fn replace(&self, connection: Arc<C>) -> Result<u64> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(ReplaceRequest { connection, ack })
            .await
            .map_err(|_| ChainError::Transport("connection supervisor stopped".into()))?;
        done.await
            .map_err(|_| ChainError::Transport("connection supervisor stopped".into()))
    }
}

/// Owner of the current-connection slot
pub struct ConnectionManager<C> {
    slot: Arc<Mutex<Arc<C>>>,
    generation: Arc<AtomicU64>,
    replacer: Replacer<C>,
}

impl<C> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            generation: Arc::clone(&self.generation),
            replacer: self.replacer.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> ConnectionManager<C> {
    /// Take ownership of `initial` and start the supervisor task
    ///
    /// The supervisor stops once the manager and every replacer are dropped.
    pub fn start(initial: C) -> Self {
        let slot = Arc::new(Mutex::new(Arc::new(initial)));
        let generation = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(supervise(Arc::clone(&slot), Arc::clone(&generation), rx));

        Self {
            slot,
            generation,
            replacer: Replacer { tx },
        }
    }

    /// Wait for exclusive access to the current connection
    pub async fn acquire(&self) -> ConnectionGuard<C> {
        let guard = Arc::clone(&self.slot).lock_owned().await;
        ConnectionGuard {
            guard,
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Snapshot of the current connection, taken under the lock
    pub async fn current(&self) -> Arc<C> {
        Arc::clone(&*self.slot.lock().await)
    }

    /// Number of replacements so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn replacer(&self) -> Replacer<C> {
        self.replacer.clone()
    }
}

/// Single writer of the slot
async fn supervise<C>(
    slot: Arc<Mutex<Arc<C>>>,
    generation: Arc<AtomicU64>,
    mut requests: mpsc::Receiver<ReplaceRequest<C>>,
) {
    debug!("Connection supervisor started");

    while let Some(request) = requests.recv().await {
        let next = {
            let mut current = slot.lock().await;
            *current = request.connection;
            generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        record_reconnect();
        info!(generation = next, "Node connection replaced");
        let _ = request.ack.send(next);
    }

    debug!("Connection supervisor stopped");
}
