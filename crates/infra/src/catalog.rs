//! Article lifecycle within the actor's tenant: listing, lookup, creation and
//! the trash (soft delete, restore, purge).
//!
//! Every call checks the permission first, then resolves the article. An
//! article of another tenant reads as missing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, instrument};

use comptoir_auth::{AuthzError, Permission, Principal, authorize};
use comptoir_core::ArticleId;
use comptoir_inventory::{Article, Availability, NewArticle, PatchError};

use crate::store::{ArticleStore, StoreError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("article not found")]
    NotFound,

    #[error("not authorized: {0}")]
    NotAuthorized(#[from] AuthzError),

    #[error(transparent)]
    Invalid(#[from] PatchError),

    #[error("article is not in the trash")]
    NotTrashed,

    #[error("libelle already used: {0}")]
    DuplicateLibelle(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => CatalogError::NotFound,
            other => CatalogError::Storage(other),
        }
    }
}

fn libelle_conflict(libelle: &str) -> impl FnOnce(StoreError) -> CatalogError + '_ {
    move |e| match e {
        StoreError::Conflict(_) => CatalogError::DuplicateLibelle(libelle.to_string()),
        other => other.into(),
    }
}

pub struct ArticleCatalog {
    articles: Arc<dyn ArticleStore>,
}

impl ArticleCatalog {
    pub fn new(articles: Arc<dyn ArticleStore>) -> Self {
        Self { articles }
    }

    pub async fn list(
        &self,
        actor: &Principal,
        availability: Option<Availability>,
    ) -> Result<Vec<Article>, CatalogError> {
        authorize(actor, &Permission::ARTICLES_READ)?;
        Ok(self.articles.list(actor.active_tenant_id, availability).await?)
    }

    pub async fn get(&self, actor: &Principal, id: ArticleId) -> Result<Article, CatalogError> {
        authorize(actor, &Permission::ARTICLES_READ)?;
        let found = self.articles.find(id).await?;
        own(actor, found)
    }

    /// Exact match on the trimmed libelle, live articles only.
    pub async fn find_by_libelle(&self, actor: &Principal, libelle: &str) -> Result<Article, CatalogError> {
        authorize(actor, &Permission::ARTICLES_READ)?;
        let found = self
            .articles
            .find_by_libelle(actor.active_tenant_id, libelle.trim())
            .await?;
        found.ok_or(CatalogError::NotFound)
    }

    /// New article in the actor's tenant from a JSON body.
    #[instrument(skip_all, fields(user_id = %actor.user_id), err)]
    pub async fn create(
        &self,
        actor: &Principal,
        body: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Article, CatalogError> {
        authorize(actor, &Permission::ARTICLES_CREATE)?;
        let draft = NewArticle::from_json(actor.active_tenant_id, body)?;
        let libelle = draft.libelle.clone();
        let article = self
            .articles
            .create(draft, now)
            .await
            .map_err(libelle_conflict(&libelle))?;
        info!(article_id = %article.id, "article created");
        Ok(article)
    }

    #[instrument(skip_all, fields(user_id = %actor.user_id, article_id = %id), err)]
    pub async fn delete(&self, actor: &Principal, id: ArticleId, now: DateTime<Utc>) -> Result<(), CatalogError> {
        authorize(actor, &Permission::ARTICLES_DELETE)?;
        let found = self.articles.find(id).await?;
        own(actor, found)?;
        self.articles.soft_delete(id, now).await?;
        info!("article moved to trash");
        Ok(())
    }

    pub async fn trashed(&self, actor: &Principal) -> Result<Vec<Article>, CatalogError> {
        authorize(actor, &Permission::ARTICLES_READ)?;
        Ok(self.articles.list_trashed(actor.active_tenant_id).await?)
    }

    #[instrument(skip_all, fields(user_id = %actor.user_id, article_id = %id), err)]
    pub async fn restore(&self, actor: &Principal, id: ArticleId, now: DateTime<Utc>) -> Result<Article, CatalogError> {
        authorize(actor, &Permission::ARTICLES_DELETE)?;
        let article = self.in_trash(actor, id).await?;
        let restored = self
            .articles
            .restore(id, now)
            .await
            .map_err(libelle_conflict(&article.libelle))?;
        info!("article restored");
        Ok(restored)
    }

    #[instrument(skip_all, fields(user_id = %actor.user_id, article_id = %id), err)]
    pub async fn force_delete(&self, actor: &Principal, id: ArticleId) -> Result<(), CatalogError> {
        authorize(actor, &Permission::ARTICLES_DELETE)?;
        self.in_trash(actor, id).await?;
        self.articles.purge(id).await?;
        info!("article purged");
        Ok(())
    }

    async fn in_trash(&self, actor: &Principal, id: ArticleId) -> Result<Article, CatalogError> {
        let found = self.articles.find_with_trashed(id).await?;
        let article = own(actor, found)?;
        if !article.is_deleted() {
            return Err(CatalogError::NotTrashed);
        }
        Ok(article)
    }
}

fn own(actor: &Principal, found: Option<Article>) -> Result<Article, CatalogError> {
    found
        .filter(|a| a.tenant_id == actor.active_tenant_id)
        .ok_or(CatalogError::NotFound)
}
