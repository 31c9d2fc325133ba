//! Prometheus metrics for the miner chain client
//!
//! Counters are recorded through the `metrics` facade. The binary installs a
//! Prometheus recorder with [`install_exporter`] when `[metrics]` is
//! enabled; without one the recording calls are no-ops.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// Metric names as constants
pub mod names {
    // Submission metrics
    pub const SUBMISSIONS_TOTAL: &str = "sminer_submissions_total";
    pub const INCLUSION_SECONDS: &str = "sminer_inclusion_duration_seconds";

    // Connection metrics
    pub const HEALTH_CHECK_FAILURES: &str = "sminer_health_check_failures_total";
    pub const RECONNECTS: &str = "sminer_reconnects_total";
}

/// Submission outcomes used as the `outcome` label
pub mod outcome {
    pub const MATCHED: &str = "matched";
    pub const NOT_FOUND: &str = "not_found";
    pub const DECODE_FAILED: &str = "decode_failed";
    pub const ERROR: &str = "error";
}

/// Install the global Prometheus recorder and serve it on `addr`
///
/// Must be called from within a tokio runtime; the HTTP listener runs as a
/// task on it.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Initialize metric descriptions
pub fn init_metrics() {
    describe_counter!(
        names::SUBMISSIONS_TOTAL,
        "Extrinsic submissions by operation and outcome"
    );
    describe_histogram!(
        names::INCLUSION_SECONDS,
        "Time from submission to in-block status in seconds"
    );
    describe_counter!(
        names::HEALTH_CHECK_FAILURES,
        "Failed node liveness checks"
    );
    describe_counter!(names::RECONNECTS, "Node connection replacements");
}

pub fn record_submission(operation: &str, outcome: &'static str) {
    let labels = [
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::SUBMISSIONS_TOTAL, &labels).increment(1);
}

pub fn record_inclusion(operation: &str, elapsed: Duration) {
    let labels = [("operation", operation.to_string())];
    histogram!(names::INCLUSION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

pub fn record_health_check_failure() {
    counter!(names::HEALTH_CHECK_FAILURES).increment(1);
}

pub fn record_reconnect() {
    counter!(names::RECONNECTS).increment(1);
}
