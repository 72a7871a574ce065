//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header (exact or `*.` wildcard, case-insensitive, port ignored)
//! - Match path prefix (case-sensitive, on segment boundaries)
//! - Match method and header conditions
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Path matching is case-sensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::body::Body;
use axum::http::{HeaderName, Method, Request};

use crate::config::{HeaderMatchConfig, RouteConfig, ValidationError};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// A parsed route path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    prefix: String,
}

impl PathPattern {
    /// Parse a pattern such as `/api`, `/orders/*` or `/files/{**rest}`.
    ///
    /// The catch-all tail is dropped; what remains is the prefix.
    pub fn parse(pattern: &str) -> Option<Self> {
        if !pattern.starts_with('/') {
            return None;
        }

        let mut prefix = pattern;
        if let Some(stripped) = prefix.strip_suffix("/*") {
            prefix = stripped;
        } else if let Some(start) = prefix.rfind("/{**") {
            if !prefix.ends_with('}') {
                return None;
            }
            prefix = &prefix[..start];
        }

        let prefix = prefix.trim_end_matches('/');
        if prefix.contains('*') || prefix.contains('{') || prefix.contains('?') {
            return None;
        }

        Some(Self {
            prefix: if prefix.is_empty() { "/".to_string() } else { prefix.to_string() },
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Specificity used for ordering; the root prefix counts as zero.
    pub fn specificity(&self) -> usize {
        if self.prefix == "/" {
            0
        } else {
            self.prefix.len()
        }
    }

    pub fn matches_path(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    pattern: PathPattern,
}

impl PathPrefixMatcher {
    pub fn new(pattern: PathPattern) -> Self {
        Self { pattern }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.pattern.matches_path(req.uri().path())
    }
}

/// Matches the request host against a list of names.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    hosts: Vec<String>,
}

impl HostMatcher {
    /// Hosts are normalized to lowercase for case-insensitive matching.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn host_matches(expected: &str, actual: &str) -> bool {
        match expected.strip_prefix("*.") {
            Some(suffix) => actual
                .strip_suffix(suffix)
                .is_some_and(|head| head.len() > 1 && head.ends_with('.')),
            None => expected == actual,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let Some(host) = request_host(req) else {
            return false;
        };
        let host = strip_port(host).to_ascii_lowercase();
        self.hosts.iter().any(|expected| Self::host_matches(expected, &host))
    }
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.methods.contains(req.method())
    }
}

/// Matches one header condition.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    values: Vec<String>,
    case_sensitive: bool,
}

impl HeaderMatcher {
    pub fn new(name: HeaderName, values: Vec<String>, case_sensitive: bool) -> Self {
        Self {
            name,
            values,
            case_sensitive,
        }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let mut present = req
            .headers()
            .get_all(&self.name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .peekable();

        if self.values.is_empty() {
            return present.peek().is_some();
        }

        present.any(|actual| {
            self.values.iter().any(|expected| {
                if self.case_sensitive {
                    expected == actual
                } else {
                    expected.eq_ignore_ascii_case(actual)
                }
            })
        })
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// Compile the predicate of a route definition.
    pub fn from_route(route: &RouteConfig) -> Result<(Self, PathPattern), ValidationError> {
        let pattern = PathPattern::parse(&route.path).ok_or_else(|| ValidationError::InvalidPath {
            route: route.id.clone(),
            path: route.path.clone(),
        })?;

        let mut matchers: Vec<Box<dyn Matcher>> =
            vec![Box::new(PathPrefixMatcher::new(pattern.clone()))];

        if !route.hosts.is_empty() {
            matchers.push(Box::new(HostMatcher::new(&route.hosts)));
        }

        if !route.methods.is_empty() {
            let methods = route
                .methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                        ValidationError::InvalidMethod {
                            route: route.id.clone(),
                            method: m.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            matchers.push(Box::new(MethodMatcher::new(methods)));
        }

        for HeaderMatchConfig { name, values, case_sensitive } in &route.headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ValidationError::InvalidHeader {
                    route: route.id.clone(),
                    header: name.clone(),
                }
            })?;
            matchers.push(Box::new(HeaderMatcher::new(header, values.clone(), *case_sensitive)));
        }

        Ok((Self::new(matchers), pattern))
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(req))
    }
}

/// Host of a request: the Host header, else the URI authority.
pub fn request_host(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: keep everything through the closing bracket.
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map_or(host, |(name, _)| name)
}
