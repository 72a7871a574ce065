//! Versioned topology snapshots.
//!
//! # Data Flow
//! ```text
//! RouteConfig[] + ClusterConfig[]
//!     → config::validation (referential integrity, syntax)
//!     → compile clusters (destinations bound to registry state)
//!     → compile routes (matchers bound to Arc<Cluster>)
//!     → ArcSwap store (atomic publish)
//!
//! Per request:
//!     current() → Arc<Snapshot> held until the response completes
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; a config change builds a new one
//! - Publish is all-or-nothing: a rejected config leaves the old snapshot
//! - Old snapshots are freed when the last request holding them finishes

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::config::validation::validate_topology;
use crate::config::{
    ClusterConfig, ConfigValidationError, HealthCheckConfig, ProxyConfig, RouteConfig,
    ValidationError,
};
use crate::health::{DestinationKey, HealthRegistry};
use crate::load_balancer::{Cluster, Destination};
use crate::observability::metrics;
use crate::routing::matcher::AndMatcher;
use crate::routing::{Route, RouteTable};

/// An immutable, versioned bundle of routes and clusters.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    routes: RouteTable,
    clusters: BTreeMap<String, Arc<Cluster>>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn cluster(&self, id: &str) -> Option<&Arc<Cluster>> {
        self.clusters.get(id)
    }

    /// Clusters ordered by id.
    pub fn clusters(&self) -> impl Iterator<Item = &Arc<Cluster>> {
        self.clusters.values()
    }
}

/// Handle to a published snapshot.
pub type SnapshotHandle = Arc<Snapshot>;

/// Owner of the active snapshot.
#[derive(Debug)]
pub struct SnapshotManager {
    current: ArcSwap<Snapshot>,
    registry: Arc<HealthRegistry>,
    health_defaults: Mutex<HealthCheckConfig>,
    publish_lock: Mutex<()>,
    next_version: AtomicU64,
}

impl SnapshotManager {
    /// Start with an empty snapshot (version 0).
    pub fn new(health_defaults: HealthCheckConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
            registry: Arc::new(HealthRegistry::new()),
            health_defaults: Mutex::new(health_defaults),
            publish_lock: Mutex::new(()),
            next_version: AtomicU64::new(1),
        }
    }

    /// Build a manager and publish the topology of a config.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigValidationError> {
        let manager = Self::new(config.health_check.clone());
        manager.publish_config(config)?;
        Ok(manager)
    }

    /// The snapshot new requests should use.
    pub fn current(&self) -> SnapshotHandle {
        self.current.load_full()
    }

    pub fn registry(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    /// Publish routes and clusters using the current health-check defaults.
    pub fn publish(
        &self,
        routes: &[RouteConfig],
        clusters: &[ClusterConfig],
    ) -> Result<SnapshotHandle, ConfigValidationError> {
        let defaults = self
            .health_defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.publish_with(routes, clusters, &defaults)
    }

    /// Publish the topology of a full config and adopt its health defaults.
    pub fn publish_config(&self, config: &ProxyConfig) -> Result<SnapshotHandle, ConfigValidationError> {
        let snapshot = self.publish_with(&config.routes, &config.clusters, &config.health_check)?;
        *self
            .health_defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = config.health_check.clone();
        Ok(snapshot)
    }

    fn publish_with(
        &self,
        routes: &[RouteConfig],
        clusters: &[ClusterConfig],
        defaults: &HealthCheckConfig,
    ) -> Result<SnapshotHandle, ConfigValidationError> {
        let errors = validate_topology(routes, clusters, defaults);
        if !errors.is_empty() {
            tracing::warn!(
                error_count = errors.len(),
                "Rejected topology, keeping current snapshot"
            );
            return Err(ConfigValidationError::new(errors));
        }

        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let snapshot = Arc::new(self.compile(version, routes, clusters, defaults)?);

        let live: HashSet<DestinationKey> = snapshot
            .clusters()
            .flat_map(|c| {
                c.destinations()
                    .iter()
                    .map(|d| DestinationKey::new(c.id.clone(), d.address.clone()))
            })
            .collect();

        self.current.store(snapshot.clone());
        self.registry.retain(&live);
        metrics::record_snapshot(version);

        tracing::info!(
            version,
            routes = snapshot.routes().len(),
            clusters = snapshot.clusters.len(),
            "Published snapshot"
        );
        Ok(snapshot)
    }

    fn compile(
        &self,
        version: u64,
        routes: &[RouteConfig],
        clusters: &[ClusterConfig],
        defaults: &HealthCheckConfig,
    ) -> Result<Snapshot, ValidationError> {
        let mut compiled = BTreeMap::new();

        for config in clusters {
            let destinations = config
                .destinations
                .iter()
                .map(|d| {
                    let invalid = || ValidationError::InvalidAddress {
                        cluster: config.id.clone(),
                        address: d.address.clone(),
                    };
                    let authority = d.address.parse().map_err(|_| invalid())?;
                    let state = self
                        .registry
                        .state_for(&DestinationKey::new(config.id.clone(), d.address.clone()));
                    Destination::new(authority, d.weight, d.max_in_flight, state)
                        .map(Arc::new)
                        .map_err(|_| invalid())
                })
                .collect::<Result<Vec<_>, _>>()?;

            let health = config
                .health_check
                .as_ref()
                .map_or_else(|| defaults.clone(), |o| o.resolve(defaults));
            let cluster = Cluster::new(config.id.clone(), destinations, config.policy, health);
            compiled.insert(config.id.clone(), Arc::new(cluster));
        }

        let mut table = Vec::with_capacity(routes.len());
        for (order, config) in routes.iter().enumerate() {
            let cluster = compiled
                .get(&config.cluster)
                .cloned()
                .ok_or_else(|| ValidationError::UnknownCluster {
                    route: config.id.clone(),
                    cluster: config.cluster.clone(),
                })?;
            let (matcher, pattern) = AndMatcher::from_route(config)?;
            table.push(Route::new(
                config.id.clone(),
                config.priority,
                order,
                pattern,
                matcher,
                cluster,
            ));
        }

        Ok(Snapshot {
            version,
            routes: RouteTable::new(table),
            clusters: compiled,
        })
    }
}
