use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde_json::Value;

use crate::app::dto::{LoginRequest, RefreshRequest};
use crate::app::errors::{self, ApiError};
use crate::app::services::AppServices;
use crate::context::{BearerClaims, PrincipalContext};

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
    field
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let login = required(body.login, "login")?;
    let password = required(body.password, "password")?;

    let pair = services.auth.login(&login, &password, Utc::now()).await?;
    Ok(errors::success(StatusCode::OK, pair, "logged in"))
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let token = required(body.refresh_token, "refresh_token")?;

    let pair = services.auth.refresh(&token, Utc::now()).await?;
    Ok(errors::success(StatusCode::OK, pair, "token refreshed"))
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(BearerClaims(claims)): Extension<BearerClaims>,
) -> Result<Response, ApiError> {
    services.auth.logout(&claims, Utc::now()).await?;
    Ok(errors::success(StatusCode::OK, Value::Null, "logged out"))
}

pub async fn current_user(Extension(principal): Extension<PrincipalContext>) -> Response {
    errors::success(StatusCode::OK, principal.user().view(), "current user")
}
