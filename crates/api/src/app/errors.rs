use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use comptoir_auth::AuthzError;
use comptoir_infra::store::StoreError;
use comptoir_infra::{AuthError, BatchError, CatalogError, UpdateError};

use crate::app::dto::{Envelope, ResponseStatus};

/// Request-level failure, rendered as a `FAILURE` envelope with `data: null`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        json_error(status, message)
    }
}

pub fn success<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    envelope(status, ResponseStatus::Success, data, message)
}

pub fn failure<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    envelope(status, ResponseStatus::Failure, data, message)
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    failure(status, Value::Null, message)
}

fn envelope<T: Serialize>(status: StatusCode, outcome: ResponseStatus, data: T, message: impl Into<String>) -> Response {
    (
        status,
        Json(Envelope {
            data,
            status: outcome,
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn batch_error_to_response(err: BatchError) -> Response {
    match err {
        BatchError::EmptyBatch => json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        BatchError::DuplicateIds(ref dups) => failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "duplicate_ids": dups }),
            err.to_string(),
        ),
        BatchError::Storage(e) => ApiError::Internal(e.to_string()).into_response(),
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidAccessToken
            | AuthError::TokenRevoked => ApiError::Unauthenticated(e.to_string()),
            AuthError::AccountInactive => ApiError::Forbidden(e.to_string()),
            AuthError::Storage(_) | AuthError::Token(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(e: AuthzError) -> Self {
        ApiError::Forbidden(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => ApiError::NotFound(m),
            StoreError::Conflict(m) | StoreError::Stale(m) => ApiError::Conflict(m),
            StoreError::Storage(m) => ApiError::Internal(m),
        }
    }
}

impl From<UpdateError> for ApiError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::NotFound => ApiError::NotFound(e.to_string()),
            UpdateError::NotAuthorized(_) => ApiError::Forbidden(e.to_string()),
            UpdateError::Invalid(_) => ApiError::Validation(e.to_string()),
            UpdateError::Storage(s) => s.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound => ApiError::NotFound(e.to_string()),
            CatalogError::NotAuthorized(_) => ApiError::Forbidden(e.to_string()),
            CatalogError::Invalid(_) => ApiError::Validation(e.to_string()),
            CatalogError::NotTrashed => ApiError::BadRequest(e.to_string()),
            CatalogError::DuplicateLibelle(_) => ApiError::Conflict(e.to_string()),
            CatalogError::Storage(s) => s.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Validation(e.body_text())
    }
}
