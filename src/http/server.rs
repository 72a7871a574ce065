//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler and middleware
//! - Bind server to listener, shut down gracefully
//! - Match routes against the current snapshot
//! - Hand matched requests to the forwarder
//! - Apply hot-reloaded configs
//! - Run the health monitor and the admin API alongside

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::{validation::validate_config, ConfigError, ProxyConfig};
use crate::forwarder::{ForwardContext, Forwarder};
use crate::health::HealthMonitor;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::ProxyError;
use crate::observability::metrics;
use crate::snapshot::SnapshotManager;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotManager>,
    pub forwarder: Forwarder,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    snapshots: Arc<SnapshotManager>,
}

impl HttpServer {
    /// Validate the configuration and publish its topology as the first snapshot.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        let snapshots = Arc::new(SnapshotManager::from_config(&config)?);

        let state = AppState {
            snapshots: snapshots.clone(),
            forwarder: Forwarder::new(&config.timeouts, &config.retries),
        };

        Ok(Self {
            router: Self::build_router(state),
            config,
            snapshots,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Each config received on `config_updates` is published; a rejected one
    /// leaves the current snapshot in place.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let monitor = HealthMonitor::new(self.snapshots.clone());
        tokio::spawn(monitor.run(shutdown.resubscribe()));

        tokio::spawn(apply_updates(
            self.snapshots.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_router = admin::router(self.snapshots.clone(), &self.config.admin);
            let mut admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, admin_router)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API stopped with error");
                }
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }
}

async fn apply_updates(
    snapshots: Arc<SnapshotManager>,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match snapshots.publish_config(&config) {
                    Ok(snapshot) => tracing::info!(version = snapshot.version(), "Configuration reloaded"),
                    Err(e) => tracing::error!(error = %e, "Rejected configuration update, keeping current snapshot"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Main proxy handler.
/// Looks up the route, then forwards to its cluster.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().clone();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let snapshot = state.snapshots.current();
    let route = match snapshot.routes().match_request(&request) {
        Ok(route) => route.clone(),
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %request.uri().path(), "No route matched");
            metrics::record_request(method.as_str(), 404, start_time);
            return ProxyError::from(e).into_response();
        }
    };

    let ctx = ForwardContext::new(client_addr, request_id.clone());
    // Dropping the handler future (caller disconnected) cancels the forward.
    let _cancel_on_drop = ctx.cancel.clone().drop_guard();

    let response = match state.forwarder.forward(request, &route.cluster, &ctx).await {
        Ok(response) => response,
        Err(e) => {
            let error = ProxyError::from(e);
            tracing::error!(
                request_id = %request_id,
                route = %route.id,
                cluster = %route.cluster.id,
                status = %error.status(),
                error = %error,
                "Forward failed"
            );
            error.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}
