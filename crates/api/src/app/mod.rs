//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store backend selection and engine construction
//! - `routes/`: HTTP handlers, one file per area
//! - `dto.rs`: request/response DTOs and the response envelope
//! - `errors.rs`: `ApiError` and envelope helpers

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: services::AppServices) -> Router {
    let auth_state = AuthState {
        engine: services.auth.clone(),
    };
    let services = Arc::new(services);

    let bearer_only = routes::bearer_router().layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::bearer_middleware,
    ));

    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let v1 = routes::public_router().merge(bearer_only).merge(protected);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/v1", v1)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(services)),
        )
}
