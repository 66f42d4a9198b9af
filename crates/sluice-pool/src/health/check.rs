//! Timed execution of the health-check capability

use std::time::Duration;

use sluice_core::Connection;
use tokio::time::Instant;
use tracing::debug;

use super::status::{HealthStatus, HealthThresholds};
use crate::pool::{ConnectionFactory, ConnectionId};

/// Result of a single health check
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// The resulting health status
    pub status: HealthStatus,
    /// How long the check took, if it completed
    pub latency: Option<Duration>,
    /// Why the check failed, if it did
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn success(latency: Duration, thresholds: &HealthThresholds) -> Self {
        Self {
            status: thresholds.classify(latency),
            latency: Some(latency),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, latency: Option<Duration>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency,
            error: Some(error.into()),
        }
    }

    /// Slow but usable connections are lent out anyway; leave a trace.
    pub(crate) fn log_if_slow(&self, id: ConnectionId) {
        if self.status == HealthStatus::Degraded {
            debug!(%id, latency = ?self.latency, "connection validated slowly");
        }
    }
}

/// Run the factory's validation against `conn`, bounded by `timeout`.
///
/// A connection that already reports itself closed fails without a
/// round-trip.
pub async fn check_connection(
    factory: &dyn ConnectionFactory,
    conn: &dyn Connection,
    timeout: Duration,
    thresholds: &HealthThresholds,
) -> HealthCheckResult {
    if conn.is_closed() {
        return HealthCheckResult::failure("connection is closed", None);
    }

    let start = Instant::now();
    match tokio::time::timeout(timeout, factory.validate(conn)).await {
        Ok(true) => HealthCheckResult::success(start.elapsed(), thresholds),
        Ok(false) => HealthCheckResult::failure("validation rejected connection", Some(start.elapsed())),
        Err(_) => HealthCheckResult::failure(format!("validation timed out after {:?}", timeout), None),
    }
}
