use axum::{
    Router,
    routing::{get, post},
};

pub mod articles;
pub mod auth;
pub mod system;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
}

/// Endpoints that only need a correctly signed, unexpired bearer.
pub fn bearer_router() -> Router {
    Router::new().route("/logout", post(auth::logout))
}

/// Fully authenticated endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .route("/user", get(auth::current_user))
        .nest("/articles", articles::router())
}
