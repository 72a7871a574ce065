//! Request forwarding.
//!
//! # Data Flow
//! ```text
//! Matched route → Arc<Cluster>
//!     → Cluster::pick (policy, excluding destinations already tried)
//!     → send: rewrite URI + headers (headers.rs), one attempt under deadline
//!     → passive health report
//!     → success: response relayed through GuardedBody (body.rs)
//!     → connection failure: backoff, pick again (GET/HEAD only)
//! ```
//!
//! # Design Decisions
//! - Bodies are streamed in both directions, never buffered
//! - Only requests that cannot carry a body are replayed
//! - A response that arrived is never retried, whatever its status
//! - The in-flight slot lives as long as the response body

pub mod body;
pub mod headers;

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::uri::Scheme;
use axum::http::{Request, Response, Uri};
use http_body::Body as HttpBody;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{RetryConfig, TimeoutConfig};
use crate::health::passive::{self, ForwardOutcome};
use crate::load_balancer::{Cluster, InFlightGuard, NoHealthyDestination};
use crate::observability::metrics;
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::with_deadline;

pub use body::GuardedBody;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Why a forward produced no response.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    NoHealthyDestination(#[from] NoHealthyDestination),

    #[error("destination {address} failed: {source}")]
    Upstream {
        address: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// The caller's request body failed while it was being sent upstream.
    #[error("request body from caller failed while sending to {address}: {source}")]
    CallerBody {
        address: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("destination {address} did not respond within {after:?}")]
    Timeout { address: String, after: Duration },

    #[error("request cancelled by the caller")]
    Cancelled,

    #[error("failed to build upstream request: {0}")]
    Build(#[from] axum::http::Error),
}

impl ForwardError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ForwardError::Timeout { .. })
    }
}

/// Per-request data the forwarder needs beyond the request itself.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    pub client_addr: SocketAddr,
    pub request_id: String,
    /// Cancelled when the caller goes away.
    pub cancel: CancellationToken,
}

impl ForwardContext {
    pub fn new(client_addr: SocketAddr, request_id: impl Into<String>) -> Self {
        Self {
            client_addr,
            request_id: request_id.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Sends requests to cluster destinations over a pooled client.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    attempt_timeout: Duration,
    retry: RetryPolicy,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig, retries: &RetryConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(timeouts.connect_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self {
            client,
            attempt_timeout: Duration::from_millis(timeouts.attempt_ms),
            retry: RetryPolicy::new(retries),
        }
    }

    /// Forward a request to a destination of `cluster`.
    ///
    /// Connection failures of GET/HEAD requests without a body are retried
    /// on destinations not yet tried. When none is left the last failure
    /// is returned.
    pub async fn forward(
        &self,
        request: Request<Body>,
        cluster: &Arc<Cluster>,
        ctx: &ForwardContext,
    ) -> Result<Response<Body>, ForwardError> {
        let (parts, body) = request.into_parts();
        let body_is_empty = body.size_hint().exact() == Some(0);
        let max_attempts = self.retry.max_attempts(&parts.method, body_is_empty);

        let mut body = Some(body);
        let mut excluded: Vec<usize> = Vec::new();
        let mut last_error: Option<ForwardError> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let guard = match cluster.pick(&excluded) {
                Ok(guard) => guard,
                Err(e) => return Err(last_error.unwrap_or(e.into())),
            };
            excluded.push(guard.index());

            // Only the first attempt can carry the caller's body; replays are empty.
            let attempt_body = body.take().unwrap_or_else(Body::empty);

            let started = Instant::now();
            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        address = %guard.address,
                        "Caller went away, abandoning attempt"
                    );
                    return Err(ForwardError::Cancelled);
                }
                result = self.send(&parts, attempt_body, &guard, ctx) => result,
            };
            let latency = started.elapsed();

            let error = match result {
                Ok(response) => {
                    passive::report(cluster, &guard, ForwardOutcome::Response(response.status()), latency);
                    return Ok(relay(response, guard, ctx));
                }
                Err(e @ ForwardError::Build(_)) => return Err(e),
                Err(e @ ForwardError::CallerBody { .. }) => {
                    tracing::info!(
                        request_id = %ctx.request_id,
                        address = %guard.address,
                        error = %e,
                        "Caller request body failed, destination not blamed"
                    );
                    return Err(e);
                }
                Err(e) => {
                    passive::report(cluster, &guard, ForwardOutcome::ConnectionFailure, latency);
                    e
                }
            };

            tracing::warn!(
                request_id = %ctx.request_id,
                cluster = %cluster.id,
                address = %guard.address,
                attempt,
                error = %error,
                "Forward attempt failed"
            );

            if attempt >= max_attempts || !cluster.has_candidate(&excluded) {
                return Err(error);
            }
            drop(guard);

            let delay = self.retry.backoff(attempt);
            tracing::info!(
                request_id = %ctx.request_id,
                cluster = %cluster.id,
                attempt,
                delay = ?delay,
                "Retrying on another destination"
            );
            metrics::record_retry(&cluster.id);

            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(ForwardError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            last_error = Some(error);
        }
    }

    /// One attempt against the destination held by `guard`, bounded by the
    /// attempt timeout up to the response head.
    pub async fn send(
        &self,
        parts: &Parts,
        body: Body,
        guard: &InFlightGuard,
        ctx: &ForwardContext,
    ) -> Result<Response<Incoming>, ForwardError> {
        let mut uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(guard.authority.clone());
        if let Some(path_and_query) = parts.uri.path_and_query() {
            uri = uri.path_and_query(path_and_query.clone());
        } else {
            uri = uri.path_and_query("/");
        }

        let mut request = Request::builder()
            .method(parts.method.clone())
            .uri(uri.build()?)
            .version(parts.version)
            .body(body)?;

        let outgoing = request.headers_mut();
        *outgoing = parts.headers.clone();
        headers::rewrite_request(outgoing, &guard.authority, ctx.client_addr.ip(), "http");
        if let Ok(id) = HeaderValue::from_str(&ctx.request_id) {
            outgoing.insert(X_REQUEST_ID, id);
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            address = %guard.address,
            method = %parts.method,
            "Sending upstream request"
        );

        match with_deadline(self.attempt_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) if caller_body_failed(&source) => Err(ForwardError::CallerBody {
                address: guard.address.clone(),
                source,
            }),
            Ok(Err(source)) => Err(ForwardError::Upstream {
                address: guard.address.clone(),
                source,
            }),
            Err(timed_out) => Err(ForwardError::Timeout {
                address: guard.address.clone(),
                after: timed_out.0,
            }),
        }
    }
}

/// Whether hyper gave up because the caller's body stream returned an error.
fn caller_body_failed(error: &hyper_util::client::legacy::Error) -> bool {
    let mut source = StdError::source(error);
    while let Some(err) = source {
        if let Some(hyper_error) = err.downcast_ref::<hyper::Error>() {
            return hyper_error.is_user()
                && hyper_error
                    .source()
                    .is_some_and(|cause| cause.is::<axum::Error>());
        }
        source = err.source();
    }
    false
}

/// Hand the destination's response to the caller, streaming its body.
fn relay(response: Response<Incoming>, guard: InFlightGuard, ctx: &ForwardContext) -> Response<Body> {
    let (mut parts, incoming) = response.into_parts();
    headers::strip_hop_by_hop(&mut parts.headers);
    if let Ok(id) = HeaderValue::from_str(&ctx.request_id) {
        parts.headers.insert(X_REQUEST_ID, id);
    }
    let body = GuardedBody::new(incoming, guard, ctx.request_id.clone());
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthCheckConfig, LoadBalancingPolicy};
    use crate::load_balancer::Destination;
    use axum::http::{Method, StatusCode};
    use tokio::net::TcpListener;

    async fn backend(name: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().fallback(move |req: Request<Body>| async move {
            let forwarded_for = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            format!("{} {} {}", name, req.uri().path(), forwarded_for)
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    /// Answers with the request body once it has fully arrived.
    async fn echo_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().fallback(|body: String| async move { body });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    /// Accepts connections and never answers.
    async fn silent_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        addr
    }

    fn cluster(addresses: &[String]) -> Arc<Cluster> {
        cluster_with(addresses, HealthCheckConfig::default())
    }

    fn cluster_with(addresses: &[String], health: HealthCheckConfig) -> Arc<Cluster> {
        let destinations = addresses
            .iter()
            .map(|a| Arc::new(Destination::detached(a).unwrap()))
            .collect();
        Arc::new(Cluster::new(
            "api",
            destinations,
            LoadBalancingPolicy::RoundRobin,
            health,
        ))
    }

    fn forwarder(attempt_ms: u64) -> Forwarder {
        let timeouts = TimeoutConfig {
            attempt_ms,
            ..TimeoutConfig::default()
        };
        let retries = RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..RetryConfig::default()
        };
        Forwarder::new(&timeouts, &retries)
    }

    fn ctx() -> ForwardContext {
        ForwardContext::new("192.0.2.9:40000".parse().unwrap(), "test-request")
    }

    fn request(method: Method, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/items?page=2")
            .header("host", "shop.example.com")
            .body(body)
            .unwrap()
    }

    async fn text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn forwards_path_and_client_address() {
        let up = backend("a").await;
        let api = cluster(&[up]);

        let response = forwarder(5_000)
            .forward(request(Method::GET, Body::empty()), &api, &ctx())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "test-request");
        assert_eq!(text(response).await, "a /items 192.0.2.9");
        assert_eq!(api.destinations()[0].in_flight(), 0);
    }

    #[tokio::test]
    async fn get_retries_on_another_destination() {
        let down = closed_port().await;
        let up = backend("b").await;
        let api = cluster(&[down, up]);

        let response = forwarder(5_000)
            .forward(request(Method::GET, Body::empty()), &api, &ctx())
            .await
            .unwrap();

        assert!(text(response).await.starts_with("b "));
        assert!(api.destinations().iter().all(|d| d.in_flight() == 0));
    }

    #[tokio::test]
    async fn post_is_not_retried() {
        let down = closed_port().await;
        let up = backend("b").await;
        let api = cluster(&[down, up]);

        let err = forwarder(5_000)
            .forward(request(Method::POST, Body::from("payload")), &api, &ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Upstream { .. }));
    }

    #[tokio::test]
    async fn exhausted_destinations_surface_last_error() {
        let api = cluster(&[closed_port().await, closed_port().await]);

        let err = forwarder(5_000)
            .forward(request(Method::GET, Body::empty()), &api, &ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Upstream { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn last_destination_fails_without_waiting_for_backoff() {
        let api = cluster(&[closed_port().await]);
        let retries = RetryConfig {
            base_delay_ms: 10_000,
            max_delay_ms: 10_000,
            ..RetryConfig::default()
        };
        let slow_backoff = Forwarder::new(&TimeoutConfig::default(), &retries);

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            slow_backoff.forward(request(Method::GET, Body::empty()), &api, &ctx()),
        )
        .await
        .expect("no backoff once every destination was tried");

        assert!(matches!(result, Err(ForwardError::Upstream { .. })));
    }

    #[tokio::test]
    async fn failing_caller_body_does_not_demote_destination() {
        let health = HealthCheckConfig {
            passive_failure_threshold: 1,
            ..HealthCheckConfig::default()
        };
        let api = cluster_with(&[echo_backend().await], health);

        let chunks = futures_util::stream::iter(vec![
            Ok("partial"),
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionAborted)),
        ]);
        let err = forwarder(5_000)
            .forward(request(Method::POST, Body::from_stream(chunks)), &api, &ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::CallerBody { .. }), "{err:?}");
        let destination = &api.destinations()[0];
        assert!(destination.is_available());
        assert_eq!(destination.in_flight(), 0);

        let response = forwarder(5_000)
            .forward(request(Method::POST, Body::from("whole")), &api, &ctx())
            .await
            .unwrap();
        assert_eq!(text(response).await, "whole");
    }

    #[tokio::test]
    async fn slow_destination_times_out() {
        let api = cluster(&[silent_backend().await]);

        let err = forwarder(100)
            .forward(request(Method::GET, Body::empty()), &api, &ctx())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(api.destinations()[0].in_flight(), 0);
    }

    #[tokio::test]
    async fn cancellation_releases_the_slot() {
        let api = cluster(&[silent_backend().await]);
        let ctx = ctx();
        let cancel = ctx.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = forwarder(5_000)
            .forward(request(Method::GET, Body::empty()), &api, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Cancelled));
        assert_eq!(api.destinations()[0].in_flight(), 0);
    }

    #[tokio::test]
    async fn empty_cluster_reports_no_destination() {
        let api = cluster(&[]);
        let err = forwarder(5_000)
            .forward(request(Method::GET, Body::empty()), &api, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::NoHealthyDestination(_)));
    }
}
