//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping requests to clusters.
    pub routes: Vec<RouteConfig>,

    /// Cluster definitions (destinations + balancing policy).
    pub clusters: Vec<ClusterConfig>,

    /// Health check defaults, overridable per cluster.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration mapping a request predicate to a cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Unique route identifier.
    pub id: String,

    /// Path pattern. A trailing `/*` or `/{**name}` is treated as a catch-all.
    #[serde(default = "default_path")]
    pub path: String,

    /// Hosts to match (case-insensitive, `*.example.com` wildcards allowed).
    #[serde(default)]
    pub hosts: Vec<String>,

    /// HTTP methods to match. Empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Header conditions, all of which must hold.
    #[serde(default)]
    pub headers: Vec<HeaderMatchConfig>,

    /// Route priority (higher wins among equally specific routes).
    #[serde(default)]
    pub priority: i32,

    /// Cluster to forward to.
    pub cluster: String,
}

impl RouteConfig {
    /// Minimal route matching a path pattern.
    pub fn new(id: impl Into<String>, path: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            hosts: Vec::new(),
            methods: Vec::new(),
            headers: Vec::new(),
            priority: 0,
            cluster: cluster.into(),
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

/// A single header condition of a route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderMatchConfig {
    /// Header name.
    pub name: String,

    /// Accepted values. Empty means the header only has to be present.
    #[serde(default)]
    pub values: Vec<String>,

    /// Compare values case-sensitively.
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Load balancing policy of a cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingPolicy {
    #[default]
    RoundRobin,
    WeightedRandom,
    LeastConnections,
}

/// Cluster configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Unique cluster identifier.
    pub id: String,

    /// Destinations in declaration order.
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,

    /// Load balancing policy.
    #[serde(default)]
    pub policy: LoadBalancingPolicy,

    /// Health check override for this cluster. Fields left out keep the
    /// values of the global `[health_check]` section.
    #[serde(default)]
    pub health_check: Option<HealthCheckOverride>,
}

impl ClusterConfig {
    /// Cluster with the given destinations and the default policy.
    pub fn new(id: impl Into<String>, destinations: Vec<DestinationConfig>) -> Self {
        Self {
            id: id.into(),
            destinations,
            policy: LoadBalancingPolicy::default(),
            health_check: None,
        }
    }
}

/// Destination configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DestinationConfig {
    /// Destination authority (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Maximum concurrent forwards to this destination. Unlimited when unset.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

impl DestinationConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            weight: default_weight(),
            max_in_flight: None,
        }
    }
}

fn default_weight() -> u32 {
    1
}

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health probes.
    pub active: bool,

    /// Probe interval in milliseconds.
    pub interval_ms: u64,

    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Path to probe.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,

    /// Enable passive health feedback from forwarded traffic.
    pub passive: bool,

    /// Consecutive forward failures that demote a destination immediately.
    pub passive_failure_threshold: u32,

    /// Time after which a passively demoted destination is retried when
    /// active probing is off.
    pub reactivation_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            active: true,
            interval_ms: 10_000,
            timeout_ms: 5_000,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            passive: true,
            passive_failure_threshold: 5,
            reactivation_ms: 30_000,
        }
    }
}

/// Per-cluster health check settings layered over the global section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckOverride {
    pub active: Option<bool>,
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub path: Option<String>,
    pub unhealthy_threshold: Option<u32>,
    pub healthy_threshold: Option<u32>,
    pub passive: Option<bool>,
    pub passive_failure_threshold: Option<u32>,
    pub reactivation_ms: Option<u64>,
}

impl HealthCheckOverride {
    /// Effective settings: set fields from `self`, the rest from `defaults`.
    pub fn resolve(&self, defaults: &HealthCheckConfig) -> HealthCheckConfig {
        HealthCheckConfig {
            active: self.active.unwrap_or(defaults.active),
            interval_ms: self.interval_ms.unwrap_or(defaults.interval_ms),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            path: self.path.clone().unwrap_or_else(|| defaults.path.clone()),
            unhealthy_threshold: self.unhealthy_threshold.unwrap_or(defaults.unhealthy_threshold),
            healthy_threshold: self.healthy_threshold.unwrap_or(defaults.healthy_threshold),
            passive: self.passive.unwrap_or(defaults.passive),
            passive_failure_threshold: self
                .passive_failure_threshold
                .unwrap_or(defaults.passive_failure_threshold),
            reactivation_ms: self.reactivation_ms.unwrap_or(defaults.reactivation_ms),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Per-attempt timeout (connect + response head) in milliseconds.
    pub attempt_ms: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            attempt_ms: 30_000,
            idle_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            base_delay_ms: 25,
            max_delay_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_topology() {
        let raw = r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [[routes]]
            id = "orders"
            path = "/orders/*"
            priority = 10
            cluster = "api"

            [[clusters]]
            id = "api"
            policy = "least_connections"

            [[clusters.destinations]]
            address = "127.0.0.1:3001"

            [[clusters.destinations]]
            address = "127.0.0.1:3002"
            weight = 3
        "#;

        let config: ProxyConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.routes[0].priority, 10);
        assert!(config.routes[0].hosts.is_empty());
        assert_eq!(config.clusters[0].policy, LoadBalancingPolicy::LeastConnections);
        assert_eq!(config.clusters[0].destinations[0].weight, 1);
        assert_eq!(config.clusters[0].destinations[1].weight, 3);
        assert!(config.clusters[0].health_check.is_none());
        assert_eq!(config.retries.max_retries, 2);
    }

    #[test]
    fn cluster_health_override_fills_from_global_section() {
        let raw = r#"
            [health_check]
            interval_ms = 1000
            unhealthy_threshold = 4

            [[clusters]]
            id = "api"
            policy = "weighted_random"

            [clusters.health_check]
            path = "/ready"
            active = false
        "#;

        let config: ProxyConfig = toml::from_str(raw).unwrap();
        let partial = config.clusters[0].health_check.as_ref().unwrap();
        assert_eq!(partial.interval_ms, None);

        let health = partial.resolve(&config.health_check);
        assert_eq!(health.path, "/ready");
        assert!(!health.active);
        assert_eq!(health.interval_ms, 1000);
        assert_eq!(health.unhealthy_threshold, 4);
        assert_eq!(health.healthy_threshold, 2);
    }
}
