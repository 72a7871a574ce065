//! Per-destination runtime state that survives snapshot swaps.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::load_balancer::DestinationState;

/// Identity of a destination across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    pub cluster: String,
    pub address: String,
}

impl DestinationKey {
    pub fn new(cluster: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            address: address.into(),
        }
    }
}

/// Registry of destination state keyed by cluster and address.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    entries: DashMap<DestinationKey, Arc<DestinationState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a destination, created in the Unknown state on first use.
    pub fn state_for(&self, key: &DestinationKey) -> Arc<DestinationState> {
        if let Some(existing) = self.entries.get(key) {
            return existing.value().clone();
        }
        self.entries.entry(key.clone()).or_default().value().clone()
    }

    /// Drop entries that are no longer part of the active topology.
    ///
    /// Requests still holding an older snapshot keep their own references.
    pub fn retain(&self, live: &HashSet<DestinationKey>) {
        self.entries.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
