use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
    routing::{delete, get, patch, post},
};
use chrono::Utc;
use serde_json::{Map, Value};

use comptoir_auth::{Permission, authorize};
use comptoir_core::ArticleId;
use comptoir_inventory::Availability;

use crate::app::dto::{BatchStockRequest, BatchStockResponse, LibelleLookup, ListArticlesQuery};
use crate::app::errors::{self, ApiError};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_articles).post(create_article))
        .route("/trashed", get(list_trashed))
        .route("/libelle", post(find_by_libelle))
        .route("/stock", post(update_stock))
        .route("/:id", get(get_article).patch(update_article).delete(delete_article))
        .route("/:id/restore", patch(restore_article))
        .route("/:id/force-delete", delete(force_delete_article))
}

fn parse_id(raw: &str) -> Result<ArticleId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound("article not found".to_string()))
}

pub async fn list_articles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListArticlesQuery>,
) -> Result<Response, ApiError> {
    let availability = match query.available.as_deref() {
        None => None,
        Some(raw) => Some(Availability::parse(raw).ok_or_else(|| {
            ApiError::Validation("invalid value for 'available' (expected yes or no)".to_string())
        })?),
    };

    let articles = services.catalog.list(principal.principal(), availability).await?;
    Ok(errors::success(StatusCode::OK, articles, "articles"))
}

pub async fn create_article(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let article = services.catalog.create(principal.principal(), &body, Utc::now()).await?;
    Ok(errors::success(StatusCode::CREATED, article, "article created"))
}

pub async fn list_trashed(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    let articles = services.catalog.trashed(principal.principal()).await?;
    Ok(errors::success(StatusCode::OK, articles, "trashed articles"))
}

pub async fn find_by_libelle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<LibelleLookup>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let libelle = body
        .libelle
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("libelle is required".to_string()))?;

    let article = services.catalog.find_by_libelle(principal.principal(), &libelle).await?;
    Ok(errors::success(StatusCode::OK, article, "article"))
}

pub async fn get_article(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let article = services.catalog.get(principal.principal(), parse_id(&id)?).await?;
    Ok(errors::success(StatusCode::OK, article, "article"))
}

pub async fn delete_article(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    services
        .catalog
        .delete(principal.principal(), parse_id(&id)?, Utc::now())
        .await?;
    Ok(errors::success(StatusCode::OK, Value::Null, "article moved to trash"))
}

pub async fn restore_article(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let article = services
        .catalog
        .restore(principal.principal(), parse_id(&id)?, Utc::now())
        .await?;
    Ok(errors::success(StatusCode::OK, article, "article restored"))
}

pub async fn force_delete_article(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    services.catalog.force_delete(principal.principal(), parse_id(&id)?).await?;
    Ok(errors::success(StatusCode::OK, Value::Null, "article deleted permanently"))
}

pub async fn update_article(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(patch) = body?;
    let id = parse_id(&id)?;

    let article = services
        .batch
        .update_one(principal.principal(), id, &patch, Utc::now())
        .await?;
    Ok(errors::success(StatusCode::OK, article, "article updated"))
}

pub async fn update_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<BatchStockRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    authorize(principal.principal(), &Permission::ARTICLES_UPDATE_MANY)?;
    let Json(body) = body?;

    let result = match services
        .batch
        .update_many(principal.principal(), &body.articles, Utc::now())
        .await
    {
        Ok(r) => r,
        Err(e) => return Ok(errors::batch_error_to_response(e)),
    };

    let response = if result.is_complete() {
        errors::success(StatusCode::OK, BatchStockResponse::from(result), "all updates applied")
    } else {
        errors::failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            BatchStockResponse::from(result),
            "some updates failed; valid articles were updated",
        )
    };
    Ok(response)
}
