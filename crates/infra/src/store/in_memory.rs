use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use comptoir_auth::{BlacklistEntry, RefreshToken, TokenKind, User};
use comptoir_core::{ArticleId, TenantId, UserId};
use comptoir_inventory::{Article, Availability, NewArticle};

use super::traits::{AccessTokenRepository, ArticleStore, IssuedTokenRecord, StoreError, TokenBlacklist, UserStore};

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

/// In-memory user store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        if users.values().any(|u| u.login == user.login) {
            return Err(StoreError::Conflict(format!("login '{}' is taken", user.login)));
        }
        users.insert(user.id, user);
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.values().find(|u| u.login == login).cloned())
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users
            .values()
            .find(|u| u.refresh_token.as_deref() == Some(token))
            .cloned())
    }

    async fn set_refresh_token(
        &self,
        id: UserId,
        expected: Option<&str>,
        token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        if let Some(expected) = expected {
            if user.refresh_token.as_deref() != Some(expected) {
                return Err(StoreError::Stale(format!("refresh token of user {id} already rotated")));
            }
        }
        user.rotate_refresh_token(token, now);
        Ok(())
    }
}

/// In-memory blacklist for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTokenBlacklist {
    entries: RwLock<HashMap<(TokenKind, String), BlacklistEntry>>,
}

impl InMemoryTokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryTokenBlacklist {
    async fn upsert(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert((entry.kind, entry.token.clone()), entry);
        Ok(())
    }

    async fn get(&self, kind: TokenKind, token: &str) -> Result<Option<BlacklistEntry>, StoreError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(&(kind, token.to_string())).cloned())
    }
}

/// In-memory record of issued access tokens.
#[derive(Debug, Default)]
pub struct InMemoryAccessTokenRepository {
    tokens: RwLock<HashMap<Uuid, IssuedTokenRecord>>,
}

impl InMemoryAccessTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessTokenRepository for InMemoryAccessTokenRepository {
    async fn record(&self, token: IssuedTokenRecord) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| poisoned())?;
        tokens.insert(token.jti, token);
        Ok(())
    }

    async fn latest_active_for_user(&self, user_id: UserId) -> Result<Option<IssuedTokenRecord>, StoreError> {
        let tokens = self.tokens.read().map_err(|_| poisoned())?;
        Ok(tokens
            .values()
            .filter(|t| t.user_id == user_id && !t.revoked)
            .max_by_key(|t| (t.issued_at, t.jti))
            .cloned())
    }

    async fn revoke(&self, jti: Uuid) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| poisoned())?;
        if let Some(t) = tokens.get_mut(&jti) {
            t.revoked = true;
        }
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
        let tokens = self.tokens.read().map_err(|_| poisoned())?;
        Ok(tokens.get(&jti).is_some_and(|t| t.revoked))
    }
}

/// In-memory article store. Every write, `save_all` included, happens under
/// a single write lock.
#[derive(Debug, Default)]
pub struct InMemoryArticleStore {
    table: RwLock<ArticleTable>,
}

#[derive(Debug, Default)]
struct ArticleTable {
    rows: BTreeMap<ArticleId, Article>,
    last_id: i64,
}

impl ArticleTable {
    fn live(&self, id: ArticleId) -> Option<&Article> {
        self.rows.get(&id).filter(|a| !a.is_deleted())
    }

    fn libelle_taken(&self, tenant_id: TenantId, libelle: &str) -> bool {
        self.rows
            .values()
            .any(|a| a.tenant_id == tenant_id && !a.is_deleted() && a.libelle == libelle)
    }

    fn trashed_mut(&mut self, id: ArticleId) -> Result<&mut Article, StoreError> {
        self.rows
            .get_mut(&id)
            .filter(|a| a.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("trashed article {id}")))
    }
}

impl InMemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleStore for InMemoryArticleStore {
    async fn create(&self, article: NewArticle, now: DateTime<Utc>) -> Result<Article, StoreError> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        if table.libelle_taken(article.tenant_id, &article.libelle) {
            return Err(StoreError::Conflict(format!("libelle '{}' is taken", article.libelle)));
        }

        table.last_id += 1;
        let created = article.with_id(ArticleId::new(table.last_id), now);
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(&self, id: ArticleId) -> Result<Option<Article>, StoreError> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table.live(id).cloned())
    }

    async fn find_with_trashed(&self, id: ArticleId) -> Result<Option<Article>, StoreError> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_libelle(&self, tenant_id: TenantId, libelle: &str) -> Result<Option<Article>, StoreError> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .values()
            .find(|a| a.tenant_id == tenant_id && !a.is_deleted() && a.libelle == libelle)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        availability: Option<Availability>,
    ) -> Result<Vec<Article>, StoreError> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .values()
            .filter(|a| a.tenant_id == tenant_id && !a.is_deleted() && a.matches(availability))
            .cloned()
            .collect())
    }

    async fn list_trashed(&self, tenant_id: TenantId) -> Result<Vec<Article>, StoreError> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.is_deleted())
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: ArticleId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        let article = table
            .rows
            .get_mut(&id)
            .filter(|a| !a.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("article {id}")))?;
        article.deleted_at = Some(now);
        article.updated_at = Some(now);
        Ok(())
    }

    async fn restore(&self, id: ArticleId, now: DateTime<Utc>) -> Result<Article, StoreError> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        let (tenant_id, libelle) = {
            let article = table.trashed_mut(id)?;
            (article.tenant_id, article.libelle.clone())
        };
        if table.libelle_taken(tenant_id, &libelle) {
            return Err(StoreError::Conflict(format!("libelle '{libelle}' is taken")));
        }
        let article = table.trashed_mut(id)?;
        article.deleted_at = None;
        article.updated_at = Some(now);
        Ok(article.clone())
    }

    async fn purge(&self, id: ArticleId) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        table.trashed_mut(id)?;
        table.rows.remove(&id);
        Ok(())
    }

    async fn save_all(&self, batch: &[Article]) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| poisoned())?;

        // Check everything before touching anything.
        if let Some(missing) = batch.iter().find(|a| table.live(a.id).is_none()) {
            return Err(StoreError::NotFound(format!("article {}", missing.id)));
        }
        let clash = batch.iter().find(|a| {
            table
                .rows
                .values()
                .chain(batch.iter())
                .any(|b| b.id != a.id && b.tenant_id == a.tenant_id && !b.is_deleted() && b.libelle == a.libelle)
        });
        if let Some(clash) = clash {
            return Err(StoreError::Conflict(format!("libelle '{}' is taken", clash.libelle)));
        }
        for article in batch {
            table.rows.insert(article.id, article.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use comptoir_auth::{Role, generate_refresh_token};

    use super::*;

    fn user(login: &str) -> User {
        User::new(TenantId::new(), login, "F", "L", "hash".to_string(), Role::CLIENT).unwrap()
    }

    #[tokio::test]
    async fn duplicate_login_is_a_conflict() {
        let store = InMemoryUserStore::new();
        store.insert(user("fatou")).await.unwrap();
        let err = store.insert(user("fatou")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn refresh_token_lookup_follows_rotation() {
        let store = InMemoryUserStore::new();
        let u = user("ibrahima");
        let id = u.id;
        store.insert(u).await.unwrap();

        let now = Utc::now();
        let first = generate_refresh_token(now, Duration::hours(1));
        let second = generate_refresh_token(now, Duration::hours(1));
        store.set_refresh_token(id, None, &first, now).await.unwrap();
        store.set_refresh_token(id, Some(&first.value), &second, now).await.unwrap();

        assert!(store.find_by_refresh_token(&first.value).await.unwrap().is_none());
        assert_eq!(store.find_by_refresh_token(&second.value).await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn conditional_rotation_refuses_a_spent_token() {
        let store = InMemoryUserStore::new();
        let u = user("moussa");
        let id = u.id;
        store.insert(u).await.unwrap();

        let now = Utc::now();
        let first = generate_refresh_token(now, Duration::hours(1));
        let second = generate_refresh_token(now, Duration::hours(1));
        let third = generate_refresh_token(now, Duration::hours(1));
        store.set_refresh_token(id, None, &first, now).await.unwrap();
        store.set_refresh_token(id, Some(&first.value), &second, now).await.unwrap();

        let err = store
            .set_refresh_token(id, Some(&first.value), &third, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Stale(_)));
        assert!(store.find_by_refresh_token(&second.value).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn blacklist_upsert_keeps_one_entry_and_moves_revoked_at() {
        let bl = InMemoryTokenBlacklist::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);
        bl.upsert(BlacklistEntry::new("jti-1", TokenKind::Access, t0)).await.unwrap();
        bl.upsert(BlacklistEntry::new("jti-1", TokenKind::Access, t1)).await.unwrap();

        assert_eq!(bl.len(), 1);
        let entry = bl.get(TokenKind::Access, "jti-1").await.unwrap().unwrap();
        assert_eq!(entry.revoked_at, t1);
        assert!(!bl.contains(TokenKind::Refresh, "jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn latest_active_token_skips_revoked_ones() {
        let repo = InMemoryAccessTokenRepository::new();
        let user_id = UserId::new();
        let now = Utc::now();
        let older = IssuedTokenRecord {
            jti: Uuid::new_v4(),
            user_id,
            issued_at: now - Duration::minutes(2),
            expires_at: now + Duration::minutes(3),
            revoked: false,
        };
        let newer = IssuedTokenRecord {
            jti: Uuid::new_v4(),
            issued_at: now,
            ..older.clone()
        };
        repo.record(older.clone()).await.unwrap();
        repo.record(newer.clone()).await.unwrap();

        assert_eq!(repo.latest_active_for_user(user_id).await.unwrap(), Some(newer.clone()));
        repo.revoke(newer.jti).await.unwrap();
        assert!(repo.is_revoked(newer.jti).await.unwrap());
        assert_eq!(repo.latest_active_for_user(user_id).await.unwrap(), Some(older));
        assert!(!repo.is_revoked(Uuid::new_v4()).await.unwrap());
    }

    fn draft(tenant: TenantId, libelle: &str, stock: i64) -> NewArticle {
        NewArticle::new(tenant, libelle, None, 100, stock).unwrap()
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids_and_guards_libelle() {
        let store = InMemoryArticleStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let riz = store.create(draft(tenant, "Riz", 4), now).await.unwrap();
        let mil = store.create(draft(tenant, "Mil", 1), now).await.unwrap();
        assert_eq!((riz.id, mil.id), (ArticleId::new(1), ArticleId::new(2)));

        let err = store.create(draft(tenant, "Riz", 1), now).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // Libelles are unique per tenant only.
        assert!(store.create(draft(TenantId::new(), "Riz", 1), now).await.is_ok());

        // A trashed article frees its libelle, and cannot come back while it is reused.
        store.soft_delete(riz.id, now).await.unwrap();
        let again = store.create(draft(tenant, "Riz", 2), now).await.unwrap();
        assert!(matches!(store.restore(riz.id, now).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.find_by_libelle(tenant, "Riz").await.unwrap().unwrap().id, again.id);
    }

    #[tokio::test]
    async fn save_all_is_all_or_nothing() {
        let store = InMemoryArticleStore::new();
        let tenant = TenantId::new();
        let a = store.create(draft(tenant, "Riz", 4), Utc::now()).await.unwrap();

        let mut changed = a.clone();
        changed.stock = 9;
        let ghost = Article::new(ArticleId::new(2), tenant, "Mil", None, 100, 1).unwrap();

        assert!(store.save_all(&[changed, ghost]).await.is_err());
        assert_eq!(store.find(a.id).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn trash_lifecycle() {
        let store = InMemoryArticleStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();
        let sucre = store.create(draft(tenant, "Sucre", 0), now).await.unwrap();

        store.soft_delete(sucre.id, now).await.unwrap();
        assert!(store.find(sucre.id).await.unwrap().is_none());
        assert!(store.find_by_libelle(tenant, "Sucre").await.unwrap().is_none());
        assert!(store.list(tenant, None).await.unwrap().is_empty());
        assert_eq!(store.list_trashed(tenant).await.unwrap().len(), 1);
        assert!(store.find_with_trashed(sucre.id).await.unwrap().unwrap().is_deleted());
        assert!(matches!(
            store.soft_delete(sucre.id, now).await,
            Err(StoreError::NotFound(_))
        ));
        // A trashed article cannot be saved by a batch.
        assert!(store.save_all(std::slice::from_ref(&sucre)).await.is_err());

        let back = store.restore(sucre.id, now).await.unwrap();
        assert!(!back.is_deleted());
        assert!(matches!(store.restore(sucre.id, now).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.purge(sucre.id).await, Err(StoreError::NotFound(_))));

        store.soft_delete(sucre.id, now).await.unwrap();
        store.purge(sucre.id).await.unwrap();
        assert!(store.find_with_trashed(sucre.id).await.unwrap().is_none());

        // Ids are never reused.
        let next = store.create(draft(tenant, "Sel", 1), now).await.unwrap();
        assert_eq!(next.id, ArticleId::new(2));
    }
}
