//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{destination::Destination, LoadBalancer};

/// Least connections selector.
/// Selects the destination with the minimum number of in-flight forwards.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn select(&self, destinations: &[Arc<Destination>], eligible: &dyn Fn(usize) -> bool) -> Option<usize> {
        // In case of tie, the first one is selected (stability)
        destinations
            .iter()
            .enumerate()
            .filter(|(index, _)| eligible(*index))
            .min_by_key(|(_, d)| d.in_flight())
            .map(|(index, _)| index)
    }
}
