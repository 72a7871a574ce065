//! Relay reverse proxy library.

// Topology
pub mod config;
pub mod routing;
pub mod snapshot;

// Traffic management
pub mod forwarder;
pub mod health;
pub mod load_balancer;

// Edge
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use snapshot::{Snapshot, SnapshotManager};
