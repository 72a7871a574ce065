//! Cluster: a named group of destinations sharing a balancing policy.
//!
//! # Responsibilities
//! - Hold the destinations of one cluster in declaration order
//! - Apply the cluster's load balancing policy to select a destination
//! - Hand out in-flight guards for the chosen destination

use std::sync::Arc;

use crate::config::{HealthCheckConfig, LoadBalancingPolicy};
use crate::load_balancer::{
    destination::{Destination, InFlightGuard},
    for_policy, LoadBalancer, NoHealthyDestination,
};

/// One cluster of a snapshot.
#[derive(Debug)]
pub struct Cluster {
    pub id: String,
    pub policy: LoadBalancingPolicy,
    /// Effective health check settings (cluster override or defaults).
    pub health: HealthCheckConfig,
    destinations: Vec<Arc<Destination>>,
    balancer: Box<dyn LoadBalancer>,
}

impl Cluster {
    pub fn new(
        id: impl Into<String>,
        destinations: Vec<Arc<Destination>>,
        policy: LoadBalancingPolicy,
        health: HealthCheckConfig,
    ) -> Self {
        Self {
            id: id.into(),
            policy,
            health,
            destinations,
            balancer: for_policy(policy),
        }
    }

    pub fn destinations(&self) -> &[Arc<Destination>] {
        &self.destinations
    }

    /// Pick a destination for a forward attempt.
    ///
    /// `excluded` lists destination indices already tried by this request.
    /// The returned guard holds an in-flight slot until dropped.
    pub fn pick(&self, excluded: &[usize]) -> Result<InFlightGuard, NoHealthyDestination> {
        let mut skipped: Vec<usize> = Vec::new();

        // A destination can hit its in-flight cap between selection and
        // acquisition; skip it and select again.
        for _ in 0..self.destinations.len() {
            let eligible = |index: usize| {
                let destination = &self.destinations[index];
                destination.is_available()
                    && !destination.is_saturated()
                    && !excluded.contains(&index)
                    && !skipped.contains(&index)
            };

            let Some(index) = self.balancer.select(&self.destinations, &eligible) else {
                break;
            };

            match self.destinations[index].try_acquire(index) {
                Some(guard) => return Ok(guard),
                None => skipped.push(index),
            }
        }

        tracing::debug!(
            cluster = %self.id,
            destination_count = self.destinations.len(),
            excluded = excluded.len(),
            "No eligible destination in cluster"
        );
        Err(NoHealthyDestination {
            cluster: self.id.clone(),
        })
    }

    /// Whether a destination outside `excluded` could take a request now.
    /// Does not advance the balancer.
    pub fn has_candidate(&self, excluded: &[usize]) -> bool {
        self.destinations.iter().enumerate().any(|(index, destination)| {
            destination.is_available() && !destination.is_saturated() && !excluded.contains(&index)
        })
    }
}
