//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each destination of the current snapshot
//!     → Update state.rs
//!
//! Passive health checks (passive.rs):
//!     Forward outcome observed
//!     → Increment failure count
//!     → Demote immediately if the burst threshold is exceeded
//!
//! State machine (state.rs):
//!     Unknown → Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - Health state is per destination and outlives snapshot swaps (registry.rs)
//! - Only this module writes health state

pub mod active;
pub mod passive;
pub mod registry;
pub mod state;

pub use active::HealthMonitor;
pub use registry::{DestinationKey, HealthRegistry};
pub use state::{HealthState, Transition};

use crate::observability::metrics;

/// Log a state change and export it.
pub(crate) fn announce(cluster: &str, address: &str, transition: Transition, cause: &'static str) {
    match transition.to {
        HealthState::Unhealthy => tracing::warn!(
            cluster = %cluster,
            address = %address,
            from = ?transition.from,
            cause,
            "Destination marked unhealthy"
        ),
        _ => tracing::info!(
            cluster = %cluster,
            address = %address,
            from = ?transition.from,
            to = ?transition.to,
            cause,
            "Destination health changed"
        ),
    }
    metrics::record_destination_health(cluster, address, transition.to);
}
