use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use comptoir_infra::{AuthEngine, Session};

use crate::app::errors::ApiError;
use crate::context::{BearerClaims, PrincipalContext};

#[derive(Clone)]
pub struct AuthState {
    pub engine: Arc<AuthEngine>,
}

/// Full authentication: signature, expiry, blacklist, revocation, live user.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;

    let Session {
        claims,
        user,
        principal,
    } = state.engine.authenticate(token, Utc::now()).await?;

    req.extensions_mut().insert(PrincipalContext::new(principal, user));
    req.extensions_mut().insert(BearerClaims(claims));

    Ok(next.run(req).await)
}

/// Signature and expiry only; an already blacklisted token passes.
pub async fn bearer_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;
    let claims = state.engine.verify_bearer(token, Utc::now())?;

    req.extensions_mut().insert(BearerClaims(claims));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let missing = || ApiError::Unauthenticated("missing bearer token".to_string());

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(missing)?;

    let header = header.to_str().map_err(|_| missing())?;

    let header = header.strip_prefix("Bearer ").ok_or_else(missing)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(missing());
    }

    Ok(token)
}
