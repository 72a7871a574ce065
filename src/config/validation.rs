//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing clusters)
//! - Validate value ranges (timeouts > 0, thresholds > 0, addresses valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over config values
//! - Runs before a snapshot is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::uri::Authority;
use axum::http::{HeaderName, Method};
use thiserror::Error;

use crate::config::schema::{ClusterConfig, HealthCheckConfig, ProxyConfig, RouteConfig};
use crate::routing::matcher::PathPattern;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate route id '{0}'")]
    DuplicateRoute(String),

    #[error("duplicate cluster id '{0}'")]
    DuplicateCluster(String),

    #[error("route '{route}' references unknown cluster '{cluster}'")]
    UnknownCluster { route: String, cluster: String },

    #[error("route '{route}' references cluster '{cluster}' which has no destinations")]
    EmptyCluster { route: String, cluster: String },

    #[error("route '{route}' has invalid path '{path}'")]
    InvalidPath { route: String, path: String },

    #[error("route '{route}' has invalid header name '{header}'")]
    InvalidHeader { route: String, header: String },

    #[error("route '{route}' has invalid method '{method}'")]
    InvalidMethod { route: String, method: String },

    #[error("cluster '{cluster}' has invalid destination address '{address}'")]
    InvalidAddress { cluster: String, address: String },

    #[error("cluster '{cluster}' lists destination '{address}' more than once")]
    DuplicateDestination { cluster: String, address: String },

    #[error("cluster '{cluster}' destination '{address}' has zero weight")]
    ZeroWeight { cluster: String, address: String },

    #[error("health check for '{scope}': {reason}")]
    InvalidHealthCheck { scope: String, reason: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("invalid listener address '{0}'")]
    InvalidListener(String),
}

/// A rejected configuration: every problem found, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration rejected: {}", join(.errors))]
pub struct ConfigValidationError {
    pub errors: Vec<ValidationError>,
}

impl ConfigValidationError {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }
}

impl From<ValidationError> for ConfigValidationError {
    fn from(err: ValidationError) -> Self {
        Self { errors: vec![err] }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a complete proxy configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), ConfigValidationError> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidListener(
            config.listener.bind_address.clone(),
        ));
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.connect_ms" });
    }
    if config.timeouts.attempt_ms == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.attempt_ms" });
    }

    errors.extend(validate_topology(
        &config.routes,
        &config.clusters,
        &config.health_check,
    ));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigValidationError::new(errors))
    }
}

/// Validate a route/cluster set as it would be published in one snapshot.
pub fn validate_topology(
    routes: &[RouteConfig],
    clusters: &[ClusterConfig],
    health_defaults: &HealthCheckConfig,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_health("defaults", health_defaults, &mut errors);

    let mut cluster_ids = HashSet::new();
    for cluster in clusters {
        if !cluster_ids.insert(cluster.id.as_str()) {
            errors.push(ValidationError::DuplicateCluster(cluster.id.clone()));
        }

        let mut addresses = HashSet::new();
        for destination in &cluster.destinations {
            if !is_valid_authority(&destination.address) {
                errors.push(ValidationError::InvalidAddress {
                    cluster: cluster.id.clone(),
                    address: destination.address.clone(),
                });
            }
            if !addresses.insert(destination.address.as_str()) {
                errors.push(ValidationError::DuplicateDestination {
                    cluster: cluster.id.clone(),
                    address: destination.address.clone(),
                });
            }
            if destination.weight == 0 {
                errors.push(ValidationError::ZeroWeight {
                    cluster: cluster.id.clone(),
                    address: destination.address.clone(),
                });
            }
        }

        if let Some(health) = &cluster.health_check {
            check_health(&cluster.id, &health.resolve(health_defaults), &mut errors);
        }
    }

    let mut route_ids = HashSet::new();
    for route in routes {
        if !route_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.id.clone()));
        }

        if PathPattern::parse(&route.path).is_none() {
            errors.push(ValidationError::InvalidPath {
                route: route.id.clone(),
                path: route.path.clone(),
            });
        }
        for header in &route.headers {
            if HeaderName::from_bytes(header.name.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidHeader {
                    route: route.id.clone(),
                    header: header.name.clone(),
                });
            }
        }
        for method in &route.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::InvalidMethod {
                    route: route.id.clone(),
                    method: method.clone(),
                });
            }
        }

        match clusters.iter().find(|c| c.id == route.cluster) {
            None => errors.push(ValidationError::UnknownCluster {
                route: route.id.clone(),
                cluster: route.cluster.clone(),
            }),
            Some(cluster) if cluster.destinations.is_empty() => {
                errors.push(ValidationError::EmptyCluster {
                    route: route.id.clone(),
                    cluster: route.cluster.clone(),
                })
            }
            Some(_) => {}
        }
    }

    errors
}

fn check_health(scope: &str, health: &HealthCheckConfig, errors: &mut Vec<ValidationError>) {
    let mut reject = |reason| {
        errors.push(ValidationError::InvalidHealthCheck {
            scope: scope.to_string(),
            reason,
        })
    };

    if health.active {
        if health.interval_ms == 0 {
            reject("interval_ms must be greater than zero");
        }
        if health.timeout_ms == 0 {
            reject("timeout_ms must be greater than zero");
        }
        if health.unhealthy_threshold == 0 || health.healthy_threshold == 0 {
            reject("thresholds must be greater than zero");
        }
        if !health.path.starts_with('/') {
            reject("path must start with '/'");
        }
    }
    if health.passive && health.passive_failure_threshold == 0 {
        reject("passive_failure_threshold must be greater than zero");
    }
}

/// A destination address must be a bare `host:port` authority.
pub(crate) fn is_valid_authority(address: &str) -> bool {
    match address.parse::<Authority>() {
        Ok(authority) => {
            authority.port_u16().is_some()
                && !authority.host().is_empty()
                && !address.contains('@')
        }
        Err(_) => false,
    }
}
