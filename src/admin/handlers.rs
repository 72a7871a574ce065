use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::LoadBalancingPolicy;
use crate::health::HealthState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub snapshot_version: u64,
    pub routes: usize,
    pub clusters: usize,
}

#[derive(Debug, Serialize)]
pub struct RouteStatus {
    pub id: String,
    pub prefix: String,
    pub priority: i32,
    pub cluster: String,
}

#[derive(Debug, Serialize)]
pub struct DestinationStatus {
    pub address: String,
    pub health: HealthState,
    pub in_flight: usize,
    pub weight: u32,
    pub max_in_flight: Option<usize>,
    pub last_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ClusterStatus {
    pub id: String,
    pub policy: LoadBalancingPolicy,
    pub destinations: Vec<DestinationStatus>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.snapshots.current();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        snapshot_version: snapshot.version(),
        routes: snapshot.routes().len(),
        clusters: snapshot.clusters().count(),
    })
}

/// Routes in match order.
pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteStatus>> {
    let snapshot = state.snapshots.current();
    let routes = snapshot
        .routes()
        .routes()
        .iter()
        .map(|r| RouteStatus {
            id: r.id.clone(),
            prefix: r.pattern.prefix().to_string(),
            priority: r.priority,
            cluster: r.cluster.id.clone(),
        })
        .collect();
    Json(routes)
}

pub async fn get_clusters(State(state): State<AdminState>) -> Json<Vec<ClusterStatus>> {
    let snapshot = state.snapshots.current();
    let clusters = snapshot
        .clusters()
        .map(|c| ClusterStatus {
            id: c.id.clone(),
            policy: c.policy,
            destinations: c
                .destinations()
                .iter()
                .map(|d| DestinationStatus {
                    address: d.address.clone(),
                    health: d.health_state(),
                    in_flight: d.in_flight(),
                    weight: d.weight,
                    max_in_flight: d.max_in_flight,
                    last_latency_ms: d.health().last_latency().as_millis() as u64,
                })
                .collect(),
        })
        .collect();
    Json(clusters)
}
