//! Transactional multi-article update with per-item failure reporting.
//!
//! ```text
//! items
//!   ↓
//! 1. reject empty batch / duplicate ids (nothing processed)
//!   ↓
//! 2. per item: id → lookup → authorize → validate patch → apply stock delta
//!      → libelle still free (a failing item is recorded and the loop continues)
//!   ↓
//! 3. persist all staged articles in one transaction
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, instrument};

use comptoir_auth::{AuthzError, Permission, Principal, authorize_in_tenant};
use comptoir_core::ArticleId;
use comptoir_inventory::{Article, ArticlePatch, PatchError};

use crate::store::{ArticleStore, StoreError};

/// Why a single submitted item was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("id missing")]
    IdMissing,

    #[error("article not found")]
    NotFound,

    #[error("not authorized")]
    NotAuthorized,

    /// Bad field value, no recognised field, or a stock delta going below zero.
    #[error(transparent)]
    Rejected(#[from] PatchError),
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A failed item, echoing what was submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedUpdate {
    pub item: Value,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Staged(Article),
    Failed(FailedUpdate),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub updated: Vec<Article>,
    pub failed: Vec<FailedUpdate>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DuplicateId {
    pub id: i64,
    pub count: usize,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("at least one article is required")]
    EmptyBatch,

    #[error("duplicate article ids: {}", describe_duplicates(.0))]
    DuplicateIds(Vec<DuplicateId>),

    #[error("batch could not be saved: {0}")]
    Storage(#[from] StoreError),
}

fn describe_duplicates(dups: &[DuplicateId]) -> String {
    dups.iter()
        .map(|d| format!("{} (x{})", d.id, d.count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a single-article update.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("article not found")]
    NotFound,

    #[error("not authorized: {0}")]
    NotAuthorized(#[from] AuthzError),

    #[error(transparent)]
    Invalid(#[from] PatchError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub struct BatchUpdateEngine {
    articles: Arc<dyn ArticleStore>,
}

impl BatchUpdateEngine {
    pub fn new(articles: Arc<dyn ArticleStore>) -> Self {
        Self { articles }
    }

    #[instrument(skip_all, fields(user_id = %actor.user_id, items = items.len()), err)]
    pub async fn update_many(
        &self,
        actor: &Principal,
        items: &[Value],
        now: DateTime<Utc>,
    ) -> Result<BatchResult, BatchError> {
        if items.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        let duplicates = find_duplicate_ids(items);
        if !duplicates.is_empty() {
            return Err(BatchError::DuplicateIds(duplicates));
        }

        let mut result = BatchResult::default();
        for item in items {
            match self.stage(actor, item, &result.updated, now).await? {
                ItemOutcome::Staged(article) => result.updated.push(article),
                ItemOutcome::Failed(failed) => result.failed.push(failed),
            }
        }

        if !result.updated.is_empty() {
            if let Err(e) = self.articles.save_all(&result.updated).await {
                error!(error = %e, staged = result.updated.len(), "batch commit failed; rolled back");
                return Err(BatchError::Storage(e));
            }
        }

        info!(
            updated = result.updated.len(),
            failed = result.failed.len(),
            "batch update applied"
        );
        Ok(result)
    }

    /// Update a single article; the `stock` field is a delta.
    #[instrument(skip_all, fields(user_id = %actor.user_id, article_id = %id), err)]
    pub async fn update_one(
        &self,
        actor: &Principal,
        id: ArticleId,
        patch: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Article, UpdateError> {
        let article = self.articles.find(id).await?.ok_or(UpdateError::NotFound)?;
        authorize_in_tenant(actor, &Permission::ARTICLES_UPDATE, article.tenant_id)?;
        let patch = ArticlePatch::from_json(patch)?;
        let updated = article.patched(&patch, now)?;
        self.ensure_libelle_free(&article, &updated, &[]).await??;
        self.articles.save_all(std::slice::from_ref(&updated)).await?;
        Ok(updated)
    }

    /// A renamed article must not take the libelle of another live article,
    /// whether stored or staged earlier in the same batch.
    async fn ensure_libelle_free(
        &self,
        before: &Article,
        after: &Article,
        staged: &[Article],
    ) -> Result<Result<(), PatchError>, StoreError> {
        if before.libelle == after.libelle {
            return Ok(Ok(()));
        }
        let stored = self.articles.find_by_libelle(after.tenant_id, &after.libelle).await?;
        let taken = stored.is_some_and(|other| other.id != after.id)
            || staged
                .iter()
                .any(|s| s.id != after.id && s.tenant_id == after.tenant_id && s.libelle == after.libelle);
        Ok(if taken { Err(PatchError::libelle_taken()) } else { Ok(()) })
    }

    async fn stage(
        &self,
        actor: &Principal,
        item: &Value,
        staged: &[Article],
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, StoreError> {
        let failed = |reason: FailureReason| {
            Ok(ItemOutcome::Failed(FailedUpdate {
                item: item.clone(),
                reason,
            }))
        };

        let Some((id, obj)) = item.as_object().and_then(|o| item_id(o).map(|id| (id, o))) else {
            return failed(FailureReason::IdMissing);
        };
        let Some(article) = self.articles.find(id).await? else {
            return failed(FailureReason::NotFound);
        };
        if authorize_in_tenant(actor, &Permission::ARTICLES_UPDATE, article.tenant_id).is_err() {
            return failed(FailureReason::NotAuthorized);
        }
        let updated = match ArticlePatch::from_json(obj).and_then(|patch| article.patched(&patch, now)) {
            Ok(updated) => updated,
            Err(e) => return failed(FailureReason::Rejected(e)),
        };
        match self.ensure_libelle_free(&article, &updated, staged).await? {
            Ok(()) => Ok(ItemOutcome::Staged(updated)),
            Err(e) => failed(FailureReason::Rejected(e)),
        }
    }
}

/// Integer `id`, also accepted as an integer string.
fn item_id(obj: &Map<String, Value>) -> Option<ArticleId> {
    match obj.get("id")? {
        Value::Number(n) => n.as_i64().map(ArticleId::new),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Ids submitted more than once, in order of first appearance.
fn find_duplicate_ids(items: &[Value]) -> Vec<DuplicateId> {
    let mut order = Vec::new();
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for id in items.iter().filter_map(|i| i.as_object().and_then(item_id)) {
        let count = counts.entry(id.get()).or_insert(0);
        if *count == 0 {
            order.push(id.get());
        }
        *count += 1;
    }
    order
        .into_iter()
        .filter_map(|id| {
            let count = counts[&id];
            (count > 1).then_some(DuplicateId { id, count })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use comptoir_auth::Role;
    use comptoir_core::{TenantId, UserId};
    use comptoir_inventory::{Availability, NewArticle, PRICE_MAX};
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryArticleStore;

    async fn seeded(tenant: TenantId) -> Arc<InMemoryArticleStore> {
        let store = Arc::new(InMemoryArticleStore::new());
        for (id, stock) in [(1, 10), (2, 3), (3, 0)] {
            let draft = NewArticle::new(tenant, format!("Article {id}"), None, 1000, stock).unwrap();
            store.create(draft, Utc::now()).await.unwrap();
        }
        store
    }

    fn manager(tenant: TenantId) -> Principal {
        Principal::from_roles(UserId::new(), tenant, vec![Role::MANAGER])
    }

    async fn stock_of(store: &InMemoryArticleStore, id: i64) -> i64 {
        store.find(ArticleId::new(id)).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn empty_batch_is_refused() {
        let tenant = TenantId::new();
        let engine = BatchUpdateEngine::new(seeded(tenant).await);
        let err = engine.update_many(&manager(tenant), &[], Utc::now()).await.unwrap_err();
        assert!(matches!(err, BatchError::EmptyBatch));
    }

    #[tokio::test]
    async fn duplicate_ids_fail_the_whole_call() {
        let tenant = TenantId::new();
        let store = seeded(tenant).await;
        let engine = BatchUpdateEngine::new(store.clone());
        let items = vec![json!({"id": 1, "stock": 1}), json!({"id": 2, "stock": 1}), json!({"id": 1})];

        let err = engine.update_many(&manager(tenant), &items, Utc::now()).await.unwrap_err();
        match err {
            BatchError::DuplicateIds(d) => assert_eq!(d, vec![DuplicateId { id: 1, count: 2 }]),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(stock_of(&store, 2).await, 3);
    }

    #[tokio::test]
    async fn partial_failure_keeps_successes() {
        let tenant = TenantId::new();
        let store = seeded(tenant).await;
        let engine = BatchUpdateEngine::new(store.clone());
        let items = vec![json!({"id": 1, "stock": 5}), json!({"id": 999, "stock": 1})];

        let result = engine.update_many(&manager(tenant), &items, Utc::now()).await.unwrap();

        assert!(!result.is_complete());
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].stock, 15);
        assert_eq!(result.failed[0].reason, FailureReason::NotFound);
        assert_eq!(result.failed[0].item, items[1]);
        assert_eq!(stock_of(&store, 1).await, 15);
    }

    #[tokio::test]
    async fn every_failure_kind_is_reported_in_order() {
        let tenant = TenantId::new();
        let store = seeded(tenant).await;
        let foreign = NewArticle::new(TenantId::new(), "Ailleurs", None, 1, 1).unwrap();
        let foreign = store.create(foreign, Utc::now()).await.unwrap();
        let engine = BatchUpdateEngine::new(store.clone());

        let items = vec![
            json!({"stock": 1}),
            json!("not an object"),
            json!({"id": foreign.id.get(), "stock": 1}),
            json!({"id": 1, "price": -4}),
            json!({"id": 2, "stock": -10}),
            json!({"id": 3}),
        ];
        let result = engine.update_many(&manager(tenant), &items, Utc::now()).await.unwrap();

        let reasons: Vec<String> = result.failed.iter().map(|f| f.reason.to_string()).collect();
        assert_eq!(
            reasons,
            vec![
                "id missing",
                "id missing",
                "not authorized",
                "invalid price: must be a non-negative integer",
                "negative stock",
                "no valid fields",
            ]
        );
        assert!(result.updated.is_empty());
        assert_eq!(stock_of(&store, 2).await, 3);
    }

    #[tokio::test]
    async fn oversized_price_fails_only_its_own_item() {
        let tenant = TenantId::new();
        let store = seeded(tenant).await;
        let engine = BatchUpdateEngine::new(store.clone());
        let items = vec![
            json!({"id": 1, "stock": 5}),
            json!({"id": 2, "price": 9_300_000_000_000_000_000u64}),
        ];

        let result = engine.update_many(&manager(tenant), &items, Utc::now()).await.unwrap();

        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(
            result.failed[0].reason.to_string(),
            format!("invalid price: cannot exceed {PRICE_MAX}")
        );
        assert_eq!(stock_of(&store, 1).await, 15);
        assert_eq!(store.find(ArticleId::new(2)).await.unwrap().unwrap().price, 1000);
    }

    #[tokio::test]
    async fn renaming_onto_a_used_libelle_fails_per_item() {
        let tenant = TenantId::new();
        let store = seeded(tenant).await;
        let engine = BatchUpdateEngine::new(store.clone());
        let items = vec![
            json!({"id": 1, "libelle": "Article 2"}),
            json!({"id": 2, "libelle": "Nouveau"}),
            json!({"id": 3, "libelle": "Nouveau", "stock": 1}),
        ];

        let result = engine.update_many(&manager(tenant), &items, Utc::now()).await.unwrap();

        let failed: Vec<(Value, String)> = result
            .failed
            .iter()
            .map(|f| (f.item["id"].clone(), f.reason.to_string()))
            .collect();
        assert_eq!(
            failed,
            vec![
                (json!(1), "invalid libelle: already used".to_string()),
                (json!(3), "invalid libelle: already used".to_string()),
            ]
        );
        assert_eq!(result.updated.len(), 1);
        let renamed = store.find_by_libelle(tenant, "Nouveau").await.unwrap().unwrap();
        assert_eq!(renamed.id, ArticleId::new(2));
        assert_eq!(stock_of(&store, 3).await, 0);

        let patch = json!({"libelle": "Article 1"}).as_object().cloned().unwrap();
        assert!(matches!(
            engine.update_one(&manager(tenant), ArticleId::new(3), &patch, Utc::now()).await,
            Err(UpdateError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn client_role_cannot_update() {
        let tenant = TenantId::new();
        let engine = BatchUpdateEngine::new(seeded(tenant).await);
        let client = Principal::from_roles(UserId::new(), tenant, vec![Role::CLIENT]);
        let result = engine
            .update_many(&client, &[json!({"id": 1, "stock": 1})], Utc::now())
            .await
            .unwrap();
        assert_eq!(result.failed[0].reason, FailureReason::NotAuthorized);
    }

    /// Reads from the wrapped store, fails every commit.
    struct CommitFails(Arc<InMemoryArticleStore>);

    #[async_trait]
    impl ArticleStore for CommitFails {
        async fn create(&self, article: NewArticle, now: DateTime<Utc>) -> Result<Article, StoreError> {
            self.0.create(article, now).await
        }

        async fn find(&self, id: ArticleId) -> Result<Option<Article>, StoreError> {
            self.0.find(id).await
        }

        async fn find_with_trashed(&self, id: ArticleId) -> Result<Option<Article>, StoreError> {
            self.0.find_with_trashed(id).await
        }

        async fn find_by_libelle(&self, tenant_id: TenantId, libelle: &str) -> Result<Option<Article>, StoreError> {
            self.0.find_by_libelle(tenant_id, libelle).await
        }

        async fn list(
            &self,
            tenant_id: TenantId,
            availability: Option<Availability>,
        ) -> Result<Vec<Article>, StoreError> {
            self.0.list(tenant_id, availability).await
        }

        async fn list_trashed(&self, tenant_id: TenantId) -> Result<Vec<Article>, StoreError> {
            self.0.list_trashed(tenant_id).await
        }

        async fn soft_delete(&self, id: ArticleId, now: DateTime<Utc>) -> Result<(), StoreError> {
            self.0.soft_delete(id, now).await
        }

        async fn restore(&self, id: ArticleId, now: DateTime<Utc>) -> Result<Article, StoreError> {
            self.0.restore(id, now).await
        }

        async fn purge(&self, id: ArticleId) -> Result<(), StoreError> {
            self.0.purge(id).await
        }

        async fn save_all(&self, _articles: &[Article]) -> Result<(), StoreError> {
            Err(StoreError::Storage("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn commit_failure_erases_every_staged_update() {
        let tenant = TenantId::new();
        let store = seeded(tenant).await;
        let engine = BatchUpdateEngine::new(Arc::new(CommitFails(store.clone())));
        let items = vec![json!({"id": 1, "stock": 1}), json!({"id": 2, "stock": 1})];

        let err = engine.update_many(&manager(tenant), &items, Utc::now()).await.unwrap_err();
        assert!(matches!(err, BatchError::Storage(_)));
        assert_eq!(stock_of(&store, 1).await, 10);
        assert_eq!(stock_of(&store, 2).await, 3);
    }

    #[tokio::test]
    async fn single_updates_accumulate_deltas() {
        let tenant = TenantId::new();
        let store = seeded(tenant).await;
        let engine = BatchUpdateEngine::new(store.clone());
        let patch = json!({"stock": 2}).as_object().cloned().unwrap();

        engine.update_one(&manager(tenant), ArticleId::new(3), &patch, Utc::now()).await.unwrap();
        let a = engine.update_one(&manager(tenant), ArticleId::new(3), &patch, Utc::now()).await.unwrap();

        assert_eq!(a.stock, 4);
        assert_eq!(stock_of(&store, 3).await, 4);
    }

    #[tokio::test]
    async fn single_update_maps_failures() {
        let tenant = TenantId::new();
        let engine = BatchUpdateEngine::new(seeded(tenant).await);
        let patch = json!({"stock": -100}).as_object().cloned().unwrap();

        assert!(matches!(
            engine.update_one(&manager(tenant), ArticleId::new(404), &patch, Utc::now()).await,
            Err(UpdateError::NotFound)
        ));
        assert!(matches!(
            engine.update_one(&manager(tenant), ArticleId::new(1), &patch, Utc::now()).await,
            Err(UpdateError::Invalid(PatchError::NegativeStock))
        ));
        let other_tenant = manager(TenantId::new());
        assert!(matches!(
            engine.update_one(&other_tenant, ArticleId::new(1), &patch, Utc::now()).await,
            Err(UpdateError::NotAuthorized(_))
        ));
    }
}
