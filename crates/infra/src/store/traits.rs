use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use comptoir_auth::{BlacklistEntry, RefreshToken, TokenKind, User};
use comptoir_core::{ArticleId, TenantId, UserId};
use comptoir_inventory::{Article, Availability, NewArticle};

/// Storage failure, independent of the backing technology.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A conditional write found the record changed since it was read.
    #[error("stale write: {0}")]
    Stale(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Issued access token as remembered by the token repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokenRecord {
    pub jti: Uuid,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. A taken login is a `Conflict`.
    async fn insert(&self, user: User) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    /// Replace the user's refresh token and its expiry.
    ///
    /// With `expected`, the write only happens while the stored token still
    /// equals it; otherwise it is `Stale`. `None` overwrites unconditionally.
    async fn set_refresh_token(
        &self,
        id: UserId,
        expected: Option<&str>,
        token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Append-only deny list. Entries are keyed by (kind, token key).
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Insert the entry, or move `revoked_at` when the key is already present.
    async fn upsert(&self, entry: BlacklistEntry) -> Result<(), StoreError>;

    async fn get(&self, kind: TokenKind, token: &str) -> Result<Option<BlacklistEntry>, StoreError>;

    async fn contains(&self, kind: TokenKind, token: &str) -> Result<bool, StoreError> {
        Ok(self.get(kind, token).await?.is_some())
    }
}

#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    async fn record(&self, token: IssuedTokenRecord) -> Result<(), StoreError>;

    /// Most recently issued, not yet revoked access token of a user.
    async fn latest_active_for_user(&self, user_id: UserId) -> Result<Option<IssuedTokenRecord>, StoreError>;

    /// Mark a token revoked. Revoking twice, or revoking an unknown jti, is not an error.
    async fn revoke(&self, jti: Uuid) -> Result<(), StoreError>;

    /// Unknown tokens are reported as not revoked.
    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Persist a new article under a store-assigned id. A libelle already used
    /// by a live article of the tenant is a `Conflict`.
    async fn create(&self, article: NewArticle, now: DateTime<Utc>) -> Result<Article, StoreError>;

    /// Soft-deleted articles are not returned.
    async fn find(&self, id: ArticleId) -> Result<Option<Article>, StoreError>;

    /// Like [`ArticleStore::find`], trashed articles included.
    async fn find_with_trashed(&self, id: ArticleId) -> Result<Option<Article>, StoreError>;

    async fn find_by_libelle(&self, tenant_id: TenantId, libelle: &str) -> Result<Option<Article>, StoreError>;

    /// Live articles of a tenant ordered by id.
    async fn list(
        &self,
        tenant_id: TenantId,
        availability: Option<Availability>,
    ) -> Result<Vec<Article>, StoreError>;

    /// Soft-deleted articles of a tenant ordered by id.
    async fn list_trashed(&self, tenant_id: TenantId) -> Result<Vec<Article>, StoreError>;

    /// Move a live article to the trash. `NotFound` unless it is live.
    async fn soft_delete(&self, id: ArticleId, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Bring a trashed article back. `NotFound` unless it is trashed,
    /// `Conflict` when a live article has taken its libelle meanwhile.
    async fn restore(&self, id: ArticleId, now: DateTime<Utc>) -> Result<Article, StoreError>;

    /// Remove a trashed article for good. `NotFound` unless it is trashed.
    async fn purge(&self, id: ArticleId) -> Result<(), StoreError>;

    /// Persist every article or none of them.
    async fn save_all(&self, articles: &[Article]) -> Result<(), StoreError>;
}
