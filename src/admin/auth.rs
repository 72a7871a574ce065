//! Admin API authentication.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::admin::AdminState;

/// Credentials presented by an admin client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
}

impl Credentials {
    /// Read a bearer token from the `Authorization` header.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token: token.to_string(),
        })
    }
}

/// Decides whether presented credentials grant admin access.
pub trait CredentialValidator: Send + Sync {
    fn validate(&self, credentials: &Credentials) -> bool;
}

/// Accepts exactly one static API key.
#[derive(Debug, Clone)]
pub struct ApiKeyValidator {
    api_key: String,
}

impl ApiKeyValidator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl CredentialValidator for ApiKeyValidator {
    fn validate(&self, credentials: &Credentials) -> bool {
        let expected = self.api_key.as_bytes();
        let given = credentials.token.as_bytes();
        // Compare every byte so timing does not reveal the matching prefix.
        expected.len() == given.len()
            && expected
                .iter()
                .zip(given)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let validator: &Arc<dyn CredentialValidator> = &state.validator;

    match Credentials::from_headers(request.headers()) {
        Some(credentials) if validator.validate(&credentials) => Ok(next.run(request).await),
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
