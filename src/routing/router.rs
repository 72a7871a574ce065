//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes pre-sorted by specificity, priority, registration order
//! - O(n) scan, first match wins (acceptable for typical route counts)
//! - Explicit RouteNotFound rather than silent default

use std::cmp::Reverse;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::load_balancer::Cluster;
use crate::routing::matcher::{AndMatcher, Matcher, PathPattern};
use crate::routing::RouteNotFound;

/// A compiled route bound to its cluster.
#[derive(Debug)]
pub struct Route {
    pub id: String,
    pub priority: i32,
    /// Registration order inside the snapshot.
    pub order: usize,
    pub pattern: PathPattern,
    pub cluster: Arc<Cluster>,
    matcher: AndMatcher,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        priority: i32,
        order: usize,
        pattern: PathPattern,
        matcher: AndMatcher,
        cluster: Arc<Cluster>,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            order,
            pattern,
            cluster,
            matcher,
        }
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

/// Immutable, ordered route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Order routes: longest prefix first, then higher priority, then
    /// earlier registration.
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by_key(|r| (Reverse(r.pattern.specificity()), Reverse(r.priority), r.order));
        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
        }
    }

    /// Find the route for a request.
    pub fn match_request(&self, req: &Request<Body>) -> Result<&Arc<Route>, RouteNotFound> {
        self.routes
            .iter()
            .find(|route| route.matches(req))
            .ok_or(RouteNotFound)
    }

    /// Routes in evaluation order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
