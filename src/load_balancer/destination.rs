//! Destination abstraction.
//!
//! # Responsibilities
//! - Represent a single destination endpoint of a cluster
//! - Track in-flight forwards (for Least Connections LB)
//! - Enforce an optional in-flight cap
//! - Expose health state read-only to the balancer

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::uri::Authority;
use url::Url;

use crate::health::state::{DestinationHealth, HealthState};

/// Runtime state shared by every snapshot that contains the same destination.
#[derive(Debug, Default)]
pub struct DestinationState {
    /// Number of forwards currently holding this destination.
    pub in_flight: AtomicUsize,
    /// Health bookkeeping, written by the health module only.
    pub health: DestinationHealth,
}

/// A single destination endpoint.
#[derive(Debug)]
pub struct Destination {
    /// The configured address (`host:port`).
    pub address: String,
    /// Parsed authority used for URI rewriting.
    pub authority: Authority,
    /// Pre-calculated base URL for health probes.
    pub base_url: Url,
    /// Weight for weighted random selection.
    pub weight: u32,
    /// Maximum concurrent forwards, if capped.
    pub max_in_flight: Option<usize>,
    state: Arc<DestinationState>,
}

impl Destination {
    /// Create a destination bound to shared runtime state.
    pub fn new(
        authority: Authority,
        weight: u32,
        max_in_flight: Option<usize>,
        state: Arc<DestinationState>,
    ) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&format!("http://{}", authority))?;
        Ok(Self {
            address: authority.to_string(),
            authority,
            base_url,
            weight,
            max_in_flight,
            state,
        })
    }

    /// Standalone destination with fresh state.
    pub fn detached(address: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let authority: Authority = address.parse()?;
        Ok(Self::new(authority, 1, None, Arc::default())?)
    }

    /// Shared runtime state.
    pub fn state(&self) -> &Arc<DestinationState> {
        &self.state
    }

    pub fn health(&self) -> &DestinationHealth {
        &self.state.health
    }

    pub fn health_state(&self) -> HealthState {
        self.state.health.state()
    }

    /// Return true if the destination may receive traffic (Healthy or Unknown).
    pub fn is_available(&self) -> bool {
        self.state.health.is_available()
    }

    /// Get the current number of in-flight forwards.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// True if the in-flight cap is reached.
    pub fn is_saturated(&self) -> bool {
        self.max_in_flight
            .is_some_and(|max| self.in_flight() >= max)
    }

    /// Try to take an in-flight slot. Fails only when the cap is reached.
    pub fn try_acquire(self: &Arc<Self>, index: usize) -> Option<InFlightGuard> {
        let counter = &self.state.in_flight;
        let mut prev = counter.load(Ordering::Relaxed);
        loop {
            if self.max_in_flight.is_some_and(|max| prev >= max) {
                return None;
            }
            match counter.compare_exchange_weak(prev, prev + 1, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
        Some(InFlightGuard {
            destination: self.clone(),
            index,
        })
    }
}

/// A RAII guard that holds one in-flight slot of a destination.
#[derive(Debug)]
pub struct InFlightGuard {
    destination: Arc<Destination>,
    index: usize,
}

impl InFlightGuard {
    /// Position of the destination inside its cluster.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn destination(&self) -> &Arc<Destination> {
        &self.destination
    }
}

impl Deref for InFlightGuard {
    type Target = Destination;
    fn deref(&self) -> &Self::Target {
        &self.destination
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.destination.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
