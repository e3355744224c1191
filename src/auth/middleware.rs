//! Authentication middleware for axum

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use super::gate::{AccessGate, AuthContext, Credential};
use crate::error::ApiError;

/// Extract HTTP Basic credentials from the Authorization header
fn basic_credential(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, payload) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }
    Credential::from_basic(payload)
}

/// Middleware that resolves the caller's [`AuthContext`] and attaches it
/// to the request.
///
/// Never rejects on its own: a missing or bad credential leaves the request
/// `Unauthenticated` and handlers decide per plugin. Only a storage failure
/// ends the request here.
pub async fn authenticate(
    State(gate): State<Arc<AccessGate>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = basic_credential(req.headers());
    let ctx = gate.authenticate(credential.as_ref()).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default())
    }
}
