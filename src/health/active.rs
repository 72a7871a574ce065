//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe destinations of the current snapshot
//! - Update destination health state based on results
//! - Reactivate passively demoted destinations of unprobed clusters

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};

use crate::health::{announce, registry::DestinationKey};
use crate::load_balancer::{Cluster, Destination};
use crate::snapshot::SnapshotManager;

/// Scheduler granularity; per-cluster intervals are rounded up to it.
const TICK: Duration = Duration::from_millis(100);

pub struct HealthMonitor {
    snapshots: Arc<SnapshotManager>,
    client: Client<HttpConnector, Body>,
    last_probe: HashMap<DestinationKey, Instant>,
    /// Probes still running; each task yields its destination key.
    probes: JoinSet<DestinationKey>,
    probing: HashSet<DestinationKey>,
}

impl HealthMonitor {
    pub fn new(snapshots: Arc<SnapshotManager>) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(HttpConnector::new());

        Self {
            snapshots,
            client,
            last_probe: HashMap::new(),
            probes: JoinSet::new(),
            probing: HashSet::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(tick = ?TICK, "Health monitor starting");

        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_due();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Start a probe for every destination whose interval has elapsed.
    ///
    /// Probes run as their own tasks, so a slow destination only delays
    /// itself. A destination whose previous probe is still running is skipped.
    pub fn check_due(&mut self) {
        while let Some(finished) = self.probes.try_join_next() {
            match finished {
                Ok(key) => {
                    self.probing.remove(&key);
                }
                Err(e) => tracing::error!(error = %e, "Health probe task failed"),
            }
        }

        let snapshot = self.snapshots.current();
        let now = Instant::now();
        let mut due = Vec::new();

        for cluster in snapshot.clusters() {
            if !cluster.health.active {
                if cluster.health.passive {
                    reactivate(cluster);
                }
                continue;
            }

            let interval = Duration::from_millis(cluster.health.interval_ms);
            for destination in cluster.destinations() {
                let key = DestinationKey::new(cluster.id.clone(), destination.address.clone());
                if self.probing.contains(&key) {
                    continue;
                }
                let is_due = self
                    .last_probe
                    .get(&key)
                    .map_or(true, |last| now.duration_since(*last) >= interval);
                if is_due {
                    self.last_probe.insert(key.clone(), now);
                    due.push((key, cluster.clone(), destination.clone()));
                }
            }
        }

        // Forget destinations that left the topology.
        self.last_probe.retain(|key, _| {
            snapshot
                .cluster(&key.cluster)
                .is_some_and(|c| c.destinations().iter().any(|d| d.address == key.address))
        });

        for (key, cluster, destination) in due {
            let client = self.client.clone();
            self.probing.insert(key.clone());
            self.probes.spawn(async move {
                probe(&client, &cluster, &destination).await;
                key
            });
        }
    }

    /// Wait for every running probe to finish.
    pub async fn settle(&mut self) {
        while let Some(finished) = self.probes.join_next().await {
            if let Ok(key) = finished {
                self.probing.remove(&key);
            }
        }
    }
}

async fn probe(client: &Client<HttpConnector, Body>, cluster: &Cluster, destination: &Destination) {
    let config = &cluster.health;
    let addr = &destination.address;

    let uri = match destination.base_url.join(&config.path) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(cluster = %cluster.id, addr = %addr, error = %e, "Invalid health check path");
            return;
        }
    };

    let request = match Request::builder()
        .method("GET")
        .uri(uri.as_str())
        .header("user-agent", "relay-proxy-health-check")
        .body(Body::empty())
    {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build health check request");
            return;
        }
    };

    let timeout = Duration::from_millis(config.timeout_ms);
    let healthy = match time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => {
            let success = response.status().is_success();
            if !success {
                tracing::debug!(addr = %addr, status = %response.status(), "Health check failed: non-success status");
            }
            success
        }
        Ok(Err(e)) => {
            tracing::debug!(addr = %addr, error = %e, "Health check failed: connection error");
            false
        }
        Err(_) => {
            tracing::debug!(addr = %addr, "Health check failed: timeout");
            false
        }
    };

    if let Some(transition) = destination.health().record_probe(healthy, config) {
        announce(&cluster.id, addr, transition, "active");
    }
}

fn reactivate(cluster: &Cluster) {
    let period = Duration::from_millis(cluster.health.reactivation_ms);
    for destination in cluster.destinations() {
        if let Some(transition) = destination.health().try_reactivate(period) {
            announce(&cluster.id, &destination.address, transition, "reactivation");
        }
    }
}
