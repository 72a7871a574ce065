//! Mapping of proxy failures to caller responses.
//!
//! Bodies are fixed strings: destination addresses and internal ids never
//! reach the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::forwarder::ForwardError;
use crate::routing::RouteNotFound;

/// A request the proxy could not serve.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    RouteNotFound(#[from] RouteNotFound),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Forward(ForwardError::NoHealthyDestination(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Forward(ForwardError::CallerBody { .. }) => StatusCode::BAD_REQUEST,
            ProxyError::Forward(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Forward(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(&self) -> &'static str {
        match self.status() {
            StatusCode::NOT_FOUND => "No matching route found",
            StatusCode::BAD_REQUEST => "Request body could not be read",
            StatusCode::SERVICE_UNAVAILABLE => "No healthy destination available",
            StatusCode::GATEWAY_TIMEOUT => "Upstream request timed out",
            _ => "Upstream request failed",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.message()).into_response()
    }
}
