//! Weighted random load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{destination::Destination, LoadBalancer};

/// Picks an eligible destination with probability proportional to its weight.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedRandom {
    fn select(&self, destinations: &[Arc<Destination>], eligible: &dyn Fn(usize) -> bool) -> Option<usize> {
        let total: u64 = destinations
            .iter()
            .enumerate()
            .filter(|(index, _)| eligible(*index))
            .map(|(_, d)| u64::from(d.weight))
            .sum();
        if total == 0 {
            return None;
        }

        let mut ticket = fastrand::u64(0..total);
        for (index, destination) in destinations.iter().enumerate() {
            if !eligible(index) {
                continue;
            }
            let weight = u64::from(destination.weight);
            if ticket < weight {
                return Some(index);
            }
            ticket -= weight;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::uri::Authority;

    fn weighted(weights: &[u32]) -> Vec<Arc<Destination>> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let authority: Authority = format!("127.0.0.1:{}", 7000 + i).parse().unwrap();
                Arc::new(Destination::new(authority, *w, None, Arc::default()).unwrap())
            })
            .collect()
    }

    #[test]
    fn follows_weights() {
        let lb = WeightedRandom::new();
        let backends = weighted(&[1, 3]);
        let mut hits = [0usize; 2];

        for _ in 0..4000 {
            hits[lb.select(&backends, &|_| true).unwrap()] += 1;
        }

        // Expected 1000 / 3000; generous bounds keep this deterministic enough.
        assert!(hits[0] > 700 && hits[0] < 1300, "{:?}", hits);
        assert_eq!(hits[0] + hits[1], 4000);
    }

    #[test]
    fn never_picks_ineligible() {
        let lb = WeightedRandom::new();
        let backends = weighted(&[100, 1]);
        for _ in 0..200 {
            assert_eq!(lb.select(&backends, &|i| i == 1), Some(1));
        }
        assert_eq!(lb.select(&backends, &|_| false), None);
    }
}
