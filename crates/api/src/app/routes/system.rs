use axum::{http::StatusCode, response::Response};
use serde_json::json;

use crate::app::errors;

pub async fn health() -> Response {
    errors::success(StatusCode::OK, json!({ "healthy": true }), "ok")
}
