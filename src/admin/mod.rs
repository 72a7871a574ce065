//! Admin API.
//!
//! Read-only views of the active snapshot, served on a separate listener
//! and guarded by a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};

use crate::config::AdminConfig;
use crate::snapshot::SnapshotManager;

use self::auth::{admin_auth_middleware, ApiKeyValidator, CredentialValidator};
use self::handlers::{get_clusters, get_routes, get_status};

#[derive(Clone)]
pub struct AdminState {
    pub snapshots: Arc<SnapshotManager>,
    pub validator: Arc<dyn CredentialValidator>,
    pub started: Instant,
}

/// Admin router using the configured API key.
pub fn router(snapshots: Arc<SnapshotManager>, config: &AdminConfig) -> Router {
    router_with_validator(snapshots, Arc::new(ApiKeyValidator::new(config.api_key.clone())))
}

pub fn router_with_validator(
    snapshots: Arc<SnapshotManager>,
    validator: Arc<dyn CredentialValidator>,
) -> Router {
    let state = AdminState {
        snapshots,
        validator,
        started: Instant::now(),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/clusters", get(get_clusters))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
