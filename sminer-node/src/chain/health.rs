//! Node liveness monitor
//!
//! Checks the current connection on a fixed interval without taking the
//! exclusive lock. Consecutive failures are counted up to
//! [`MAX_HEALTH_CHECK_FAILURES`]; at the cap a fresh session is opened and, only if
//! that succeeds, handed to the connection supervisor. A failed reconnect
//! keeps the old session and retries on the next tick.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::connection::{ConnectionManager, Connector, Replacer};
use super::rpc::ChainRpc;
use super::types::constants::MAX_HEALTH_CHECK_FAILURES;
use crate::metrics::record_health_check_failure;

/// Monitor timing
#[derive(Debug, Clone, Copy)]
pub struct HealthSettings {
    pub interval: Duration,
    pub check_timeout: Duration,
    /// Treat a node with zero peers as unhealthy
    pub require_peers: bool,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Healthy { peers: u64 },
    CheckFailed { failures: u8 },
    Reconnected { generation: u64 },
    ReconnectFailed,
}

pub struct HealthMonitor<C, K> {
    current: Arc<C>,
    replacer: Replacer<C>,
    connector: K,
    settings: HealthSettings,
    failures: u8,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<C: ChainRpc, K: Connector<C>> HealthMonitor<C, K> {
    pub async fn new(manager: &ConnectionManager<C>, connector: K, settings: HealthSettings) -> Self {
        Self {
            current: manager.current().await,
            replacer: manager.replacer(),
            connector,
            settings,
            failures: 0,
        }
    }

    /// Consecutive failed health checks, saturating at the cap
    pub fn failures(&self) -> u8 {
        self.failures
    }

    async fn check_liveness(&self) -> Result<u64, String> {
        let call = AssertUnwindSafe(self.current.system_health()).catch_unwind();
        match tokio::time::timeout(self.settings.check_timeout, call).await {
            Err(_) => Err(format!("health check timed out after {:?}", self.settings.check_timeout)),
            Ok(Err(panic)) => Err(format!("health check panicked: {}", panic_message(&*panic))),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Ok(Ok(health))) if self.settings.require_peers && health.peers == 0 => {
                Err("node reports no peers".to_string())
            }
            Ok(Ok(Ok(health))) => Ok(health.peers),
        }
    }

    async fn reconnect(&mut self) -> TickOutcome {
        let attempt = AssertUnwindSafe(self.connector.connect()).catch_unwind().await;
        let connection = match attempt {
            Ok(Ok(connection)) => Arc::new(connection),
            Ok(Err(e)) => {
                error!(error = %e, "Reconnect failed, keeping current connection");
                return TickOutcome::ReconnectFailed;
            }
            Err(panic) => {
                error!(panic = %panic_message(&*panic), "Reconnect panicked, keeping current connection");
                return TickOutcome::ReconnectFailed;
            }
        };

        match self.replacer.replace(Arc::clone(&connection)).await {
            Ok(generation) => {
                self.current = connection;
                self.failures = 0;
                TickOutcome::Reconnected { generation }
            }
            Err(e) => {
                error!(error = %e, "Connection replacement failed");
                TickOutcome::ReconnectFailed
            }
        }
    }

    /// Run one check/reconnect step
    pub async fn tick(&mut self) -> TickOutcome {
        if self.failures < MAX_HEALTH_CHECK_FAILURES {
            match self.check_liveness().await {
                Ok(peers) => {
                    if self.failures > 0 {
                        info!(peers, "Node health check recovered");
                    }
                    debug!(peers, "Node health check ok");
                    self.failures = 0;
                    return TickOutcome::Healthy { peers };
                }
                Err(reason) => {
                    self.failures = self.failures.saturating_add(1).min(MAX_HEALTH_CHECK_FAILURES);
                    record_health_check_failure();
                    warn!(failures = self.failures, reason = %reason, "Node health check failed");
                }
            }
            if self.failures < MAX_HEALTH_CHECK_FAILURES {
                return TickOutcome::CheckFailed {
                    failures: self.failures,
                };
            }
        }

        self.reconnect().await
    }

    /// Tick forever; the first tick fires one interval after start
    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            check_timeout_secs = self.settings.check_timeout.as_secs(),
            "Starting node health monitor"
        );

        let mut interval = interval_at(Instant::now() + self.settings.interval, self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let outcome = self.tick().await;
            debug!(outcome = ?outcome, "Health tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{HealthScript, MockChainRpc, MockConnector};

    fn settings() -> HealthSettings {
        HealthSettings {
            interval: Duration::from_secs(25),
            check_timeout: Duration::from_secs(10),
            require_peers: true,
        }
    }

    async fn setup(
        script: HealthScript,
    ) -> (
        ConnectionManager<MockChainRpc>,
        Arc<MockConnector>,
        HealthMonitor<MockChainRpc, Arc<MockConnector>>,
    ) {
        let node = MockChainRpc::new();
        node.set_health(script);
        let manager = ConnectionManager::start(node);
        let connector = Arc::new(MockConnector::new());
        let monitor = HealthMonitor::new(&manager, Arc::clone(&connector), settings()).await;
        (manager, connector, monitor)
    }

    #[tokio::test]
    async fn test_two_failures_replace_connection() {
        let (manager, connector, mut monitor) = setup(HealthScript::Fail).await;

        assert_eq!(monitor.tick().await, TickOutcome::CheckFailed { failures: 1 });
        assert_eq!(manager.generation(), 0);
        assert_eq!(manager.acquire().await.id(), 0);

        assert_eq!(monitor.tick().await, TickOutcome::Reconnected { generation: 1 });
        assert_eq!(manager.generation(), 1);
        assert_eq!(monitor.failures(), 0);
        assert_eq!(connector.attempts(), 1);
        assert_eq!(manager.acquire().await.id(), 101);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let (manager, _connector, mut monitor) = setup(HealthScript::Fail).await;

        monitor.tick().await;
        assert_eq!(monitor.failures(), 1);

        manager.acquire().await.set_health(HealthScript::Peers(5));
        assert_eq!(monitor.tick().await, TickOutcome::Healthy { peers: 5 });
        assert_eq!(monitor.failures(), 0);
        assert_eq!(manager.generation(), 0);
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_old_connection() {
        let (manager, connector, mut monitor) = setup(HealthScript::Fail).await;
        connector.set_failing(true);

        monitor.tick().await;
        assert_eq!(monitor.tick().await, TickOutcome::ReconnectFailed);
        assert_eq!(monitor.failures(), MAX_HEALTH_CHECK_FAILURES);
        assert_eq!(manager.generation(), 0);
        assert_eq!(manager.acquire().await.id(), 0);

        // at the cap the next tick goes straight to reconnecting
        let checks = manager.acquire().await.health_checks();
        connector.set_failing(false);
        assert_eq!(monitor.tick().await, TickOutcome::Reconnected { generation: 1 });
        assert_eq!(manager.current().await.health_checks(), 0);
        assert_eq!(checks, 2);
    }

    #[tokio::test]
    async fn test_panicking_health_check_counts_as_failure() {
        let (_manager, _connector, mut monitor) = setup(HealthScript::Panic).await;
        assert_eq!(monitor.tick().await, TickOutcome::CheckFailed { failures: 1 });
    }

    #[tokio::test]
    async fn test_zero_peers_is_unhealthy() {
        let (_manager, _connector, mut monitor) = setup(HealthScript::Peers(0)).await;
        assert_eq!(monitor.tick().await, TickOutcome::CheckFailed { failures: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_health_check_times_out() {
        let (_manager, _connector, mut monitor) = setup(HealthScript::Hang).await;

        let start = Instant::now();
        assert_eq!(monitor.tick().await, TickOutcome::CheckFailed { failures: 1 });
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval() {
        let node = MockChainRpc::new();
        let manager = ConnectionManager::start(node);
        let monitor = HealthMonitor::new(&manager, Arc::new(MockConnector::new()), settings()).await;
        let task = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_secs(24)).await;
        assert_eq!(manager.current().await.health_checks(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(manager.current().await.health_checks(), 2);
        task.abort();
    }
}
