//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{destination::Destination, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through destinations.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, destinations: &[Arc<Destination>], eligible: &dyn Fn(usize) -> bool) -> Option<usize> {
        if destinations.is_empty() {
            return None;
        }

        // One cursor step per pick, then scan forward past ineligible entries.
        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = destinations.len();

        (0..len)
            .map(|i| start.wrapping_add(i) % len)
            .find(|&index| eligible(index))
    }
}
