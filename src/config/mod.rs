//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → snapshot::SnapshotManager compiles routes + clusters
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → channel to the server, which publishes a new snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ClusterConfig, DestinationConfig, HeaderMatchConfig, HealthCheckConfig,
    HealthCheckOverride, ListenerConfig, LoadBalancingPolicy, ObservabilityConfig, ProxyConfig,
    RetryConfig, RouteConfig, TimeoutConfig,
};
pub use validation::{ConfigValidationError, ValidationError};
pub use watcher::ConfigWatcher;
