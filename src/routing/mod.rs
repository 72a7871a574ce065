//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, host, path, headers)
//!     → router.rs (route lookup in the snapshot's table)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route or RouteNotFound
//!
//! Route Compilation (at snapshot publish):
//!     RouteConfig[]
//!     → Compile matchers
//!     → Sort by prefix length, priority, registration order
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at publish, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by specificity)

use thiserror::Error;

pub mod matcher;
pub mod router;

pub use router::{Route, RouteTable};

/// No route accepts the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no route matches the request")]
pub struct RouteNotFound;
