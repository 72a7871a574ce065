//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Observe forward outcomes
//! - Track consecutive failures
//! - Trigger state transition on threshold breach
//!
//! # Design Decisions
//! - Only connection errors, timeouts and gateway 5xx count as failures
//! - 4xx are NOT failures (client error, not destination)
//! - Thread-safe counters for concurrent request tracking

use std::time::Duration;

use axum::http::StatusCode;

use crate::health::announce;
use crate::load_balancer::{Cluster, Destination};
use crate::observability::metrics;

/// Outcome of one forward attempt, as seen by passive health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// A response head arrived with this status.
    Response(StatusCode),
    /// The attempt failed before any response byte (refused, reset, timeout).
    ConnectionFailure,
}

impl ForwardOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            ForwardOutcome::ConnectionFailure => true,
            ForwardOutcome::Response(status) => matches!(
                *status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            ),
        }
    }
}

/// Feed a forward outcome into the destination's health.
pub fn report(cluster: &Cluster, destination: &Destination, outcome: ForwardOutcome, latency: Duration) {
    metrics::record_forward_latency(&cluster.id, latency);

    let transition = destination
        .health()
        .record_forward(!outcome.is_failure(), latency, &cluster.health);

    if let Some(transition) = transition {
        announce(&cluster.id, &destination.address, transition, "passive");
    }
}
