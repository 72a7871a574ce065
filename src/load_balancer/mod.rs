//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → cluster resolved from the snapshot
//!     → cluster.rs (eligible destinations for this request)
//!     → Apply load balancing policy:
//!         - round_robin.rs (rotate through destinations)
//!         - weighted.rs (random, proportional to weight)
//!         - least_conn.rs (pick destination with fewest in-flight forwards)
//!     → destination.rs (take an in-flight slot)
//!     → Return guard or NoHealthyDestination
//! ```
//!
//! # Design Decisions
//! - Policies hold only their own cursor; destinations track in-flight counts
//! - Policy selection per cluster
//! - Unhealthy and already-tried destinations excluded from selection
//! - Counters use atomics; nothing is locked for the duration of a forward

use std::sync::Arc;

use thiserror::Error;

pub mod cluster;
pub mod destination;
pub mod least_conn;
pub mod round_robin;
pub mod weighted;

pub use cluster::Cluster;
pub use destination::{Destination, DestinationState, InFlightGuard};

use crate::config::LoadBalancingPolicy;

/// A cluster had no destination able to take the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no healthy destination in cluster '{cluster}'")]
pub struct NoHealthyDestination {
    pub cluster: String,
}

/// Selection strategy over a cluster's destinations.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Return the index of the chosen destination, skipping every index for
    /// which `eligible` is false.
    fn select(&self, destinations: &[Arc<Destination>], eligible: &dyn Fn(usize) -> bool) -> Option<usize>;
}

/// Build the balancer for a policy.
pub fn for_policy(policy: LoadBalancingPolicy) -> Box<dyn LoadBalancer> {
    match policy {
        LoadBalancingPolicy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        LoadBalancingPolicy::WeightedRandom => Box::new(weighted::WeightedRandom::new()),
        LoadBalancingPolicy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::HealthCheckConfig;

    pub fn destinations(n: usize) -> Vec<Arc<Destination>> {
        (0..n)
            .map(|i| Arc::new(Destination::detached(&format!("127.0.0.1:{}", 9000 + i)).unwrap()))
            .collect()
    }

    pub fn mark_unhealthy(destination: &Destination) {
        destination.health().record_probe(false, &HealthCheckConfig::default());
    }

    pub fn mark_healthy(destination: &Destination) {
        destination.health().record_probe(true, &HealthCheckConfig::default());
    }
}
