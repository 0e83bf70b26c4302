use serde::{Deserialize, Serialize};
use serde_json::Value;

use comptoir_infra::{BatchResult, FailedUpdate};
use comptoir_inventory::Article;

// -------------------------
// Envelope
// -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Every response body: `{data, status, message}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    pub status: ResponseStatus,
    pub message: String,
}

// -------------------------
// Request DTOs
// -------------------------

/// Both fields are optional at the serde level so a missing one is reported
/// as a validation error instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListArticlesQuery {
    pub available: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LibelleLookup {
    pub libelle: Option<String>,
}

/// Items stay raw so failures can echo exactly what was sent.
#[derive(Debug, Deserialize)]
pub struct BatchStockRequest {
    #[serde(default)]
    pub articles: Vec<Value>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct BatchStockResponse {
    pub updated_articles: Vec<Article>,
    pub failed_updates: Vec<FailedUpdate>,
}

impl From<BatchResult> for BatchStockResponse {
    fn from(r: BatchResult) -> Self {
        Self {
            updated_articles: r.updated,
            failed_updates: r.failed,
        }
    }
}
