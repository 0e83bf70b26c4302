//! Postgres-backed stores.
//!
//! Runtime-checked queries against the schema in `sql/schema.sql`. Every store
//! wraps the same shared `PgPool`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any | `Storage` |
//! | PoolClosed / network / decode | N/A | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use comptoir_auth::{BlacklistEntry, RefreshToken, Role, TokenKind, User, UserStatus};
use comptoir_core::{ArticleId, TenantId, UserId};
use comptoir_inventory::{Article, Availability, NewArticle};

use super::traits::{AccessTokenRepository, ArticleStore, IssuedTokenRecord, StoreError, TokenBlacklist, UserStore};

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Conflict(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        other => StoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

fn decode_error(operation: &str, what: impl core::fmt::Display) -> StoreError {
    StoreError::Storage(format!("undecodable row in {operation}: {what}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

const USER_COLUMNS: &str = "id, tenant_id, login, first_name, last_name, password_hash, role, status, \
     refresh_token, refresh_token_expires_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn row_to_user(row: &PgRow) -> Result<User, StoreError> {
        let op = "row_to_user";
        let status: String = row.try_get("status").map_err(|e| map_sqlx_error(op, e))?;
        let role: String = row.try_get("role").map_err(|e| map_sqlx_error(op, e))?;
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id").map_err(|e| map_sqlx_error(op, e))?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(|e| map_sqlx_error(op, e))?),
            login: row.try_get("login").map_err(|e| map_sqlx_error(op, e))?,
            first_name: row.try_get("first_name").map_err(|e| map_sqlx_error(op, e))?,
            last_name: row.try_get("last_name").map_err(|e| map_sqlx_error(op, e))?,
            password_hash: row.try_get("password_hash").map_err(|e| map_sqlx_error(op, e))?,
            role: Role::new(role),
            status: UserStatus::parse(&status).ok_or_else(|| decode_error(op, format!("status '{status}'")))?,
            refresh_token: row.try_get("refresh_token").map_err(|e| map_sqlx_error(op, e))?,
            refresh_token_expires_at: row
                .try_get("refresh_token_expires_at")
                .map_err(|e| map_sqlx_error(op, e))?,
            created_at: row.try_get("created_at").map_err(|e| map_sqlx_error(op, e))?,
            updated_at: row.try_get("updated_at").map_err(|e| map_sqlx_error(op, e))?,
        })
    }

    async fn find_one(&self, operation: &str, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(Self::row_to_user).transpose()
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert(&self, user: User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, tenant_id, login, first_name, last_name, password_hash, role, status,
                refresh_token, refresh_token_expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.tenant_id.as_uuid())
        .bind(&user.login)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(&user.refresh_token)
        .bind(user.refresh_token_expires_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_id", e))?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.find_one("find_user_by_login", "login", login).await
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.find_one("find_user_by_refresh_token", "refresh_token", token).await
    }

    /// Compare-and-swap on the stored token when `expected` is given.
    #[instrument(skip(self, expected, token), fields(user_id = %id), err)]
    async fn set_refresh_token(
        &self,
        id: UserId,
        expected: Option<&str>,
        token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $2, refresh_token_expires_at = $3, updated_at = $4
            WHERE id = $1 AND ($5::TEXT IS NULL OR refresh_token = $5)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&token.value)
        .bind(token.expires_at)
        .bind(now)
        .bind(expected)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_refresh_token", e))?;

        if result.rows_affected() == 0 {
            return Err(match expected {
                Some(_) => StoreError::Stale(format!("refresh token of user {id} already rotated")),
                None => StoreError::NotFound(format!("user {id}")),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token blacklist
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresTokenBlacklist {
    pool: Arc<PgPool>,
}

impl PostgresTokenBlacklist {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl TokenBlacklist for PostgresTokenBlacklist {
    #[instrument(skip(self, entry), fields(kind = %entry.kind), err)]
    async fn upsert(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO token_blacklist (kind, token, revoked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (kind, token)
            DO UPDATE SET revoked_at = EXCLUDED.revoked_at
            "#,
        )
        .bind(entry.kind.as_str())
        .bind(&entry.token)
        .bind(entry.revoked_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("blacklist_upsert", e))?;
        Ok(())
    }

    async fn get(&self, kind: TokenKind, token: &str) -> Result<Option<BlacklistEntry>, StoreError> {
        let row = sqlx::query("SELECT revoked_at FROM token_blacklist WHERE kind = $1 AND token = $2")
            .bind(kind.as_str())
            .bind(token)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("blacklist_get", e))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let revoked_at: DateTime<Utc> =
                    row.try_get("revoked_at").map_err(|e| map_sqlx_error("blacklist_get", e))?;
                Ok(Some(BlacklistEntry::new(token, kind, revoked_at)))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Issued access tokens
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresAccessTokenRepository {
    pool: Arc<PgPool>,
}

impl PostgresAccessTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl AccessTokenRepository for PostgresAccessTokenRepository {
    async fn record(&self, token: IssuedTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (jti, user_id, issued_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token.jti)
        .bind(token.user_id.as_uuid())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_access_token", e))?;
        Ok(())
    }

    async fn latest_active_for_user(&self, user_id: UserId) -> Result<Option<IssuedTokenRecord>, StoreError> {
        let op = "latest_active_access_token";
        let row = sqlx::query(
            r#"
            SELECT jti, user_id, issued_at, expires_at, revoked
            FROM access_tokens
            WHERE user_id = $1 AND revoked = FALSE
            ORDER BY issued_at DESC, jti DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(IssuedTokenRecord {
            jti: row.try_get("jti").map_err(|e| map_sqlx_error(op, e))?,
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id").map_err(|e| map_sqlx_error(op, e))?),
            issued_at: row.try_get("issued_at").map_err(|e| map_sqlx_error(op, e))?,
            expires_at: row.try_get("expires_at").map_err(|e| map_sqlx_error(op, e))?,
            revoked: row.try_get("revoked").map_err(|e| map_sqlx_error(op, e))?,
        }))
    }

    async fn revoke(&self, jti: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE access_tokens SET revoked = TRUE WHERE jti = $1")
            .bind(jti)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_access_token", e))?;
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
        let revoked: Option<bool> = sqlx::query_scalar("SELECT revoked FROM access_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_access_token_revoked", e))?;
        Ok(revoked.unwrap_or(false))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Articles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresArticleStore {
    pool: Arc<PgPool>,
}

impl PostgresArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn row_to_article(row: &PgRow) -> Result<Article, StoreError> {
        let op = "row_to_article";
        let price: i64 = row.try_get("price").map_err(|e| map_sqlx_error(op, e))?;
        Ok(Article {
            id: ArticleId::new(row.try_get("id").map_err(|e| map_sqlx_error(op, e))?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(|e| map_sqlx_error(op, e))?),
            libelle: row.try_get("libelle").map_err(|e| map_sqlx_error(op, e))?,
            description: row.try_get("description").map_err(|e| map_sqlx_error(op, e))?,
            price: u64::try_from(price).map_err(|_| decode_error(op, format!("price {price}")))?,
            stock: row.try_get("stock").map_err(|e| map_sqlx_error(op, e))?,
            created_at: row.try_get("created_at").map_err(|e| map_sqlx_error(op, e))?,
            updated_at: row.try_get("updated_at").map_err(|e| map_sqlx_error(op, e))?,
            deleted_at: row.try_get("deleted_at").map_err(|e| map_sqlx_error(op, e))?,
        })
    }
}

/// Validated prices always fit; this only guards hand-built records.
fn price_to_sql(price: u64) -> Result<i64, StoreError> {
    i64::try_from(price).map_err(|_| StoreError::Storage(format!("price {price} out of range")))
}

#[async_trait]
impl ArticleStore for PostgresArticleStore {
    #[instrument(skip(self, article), fields(tenant_id = %article.tenant_id), err)]
    async fn create(&self, article: NewArticle, now: DateTime<Utc>) -> Result<Article, StoreError> {
        let price = price_to_sql(article.price)?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles (tenant_id, libelle, description, price, stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id
            "#,
        )
        .bind(article.tenant_id.as_uuid())
        .bind(&article.libelle)
        .bind(&article.description)
        .bind(price)
        .bind(article.stock)
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_article", e))?;
        Ok(article.with_id(ArticleId::new(id), now))
    }

    async fn find(&self, id: ArticleId) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = $1 AND deleted_at IS NULL")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_article", e))?;
        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn find_with_trashed(&self, id: ArticleId) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_article_with_trashed", e))?;
        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn find_by_libelle(&self, tenant_id: TenantId, libelle: &str) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM articles WHERE tenant_id = $1 AND libelle = $2 AND deleted_at IS NULL",
        )
        .bind(tenant_id.as_uuid())
        .bind(libelle)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_article_by_libelle", e))?;
        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        availability: Option<Availability>,
    ) -> Result<Vec<Article>, StoreError> {
        let filter = match availability {
            None => "",
            Some(Availability::InStock) => "AND stock > 0",
            Some(Availability::OutOfStock) => "AND stock = 0",
        };
        let sql = format!(
            "SELECT * FROM articles WHERE tenant_id = $1 AND deleted_at IS NULL {filter} ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_articles", e))?;
        rows.iter().map(Self::row_to_article).collect()
    }

    async fn list_trashed(&self, tenant_id: TenantId) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query("SELECT * FROM articles WHERE tenant_id = $1 AND deleted_at IS NOT NULL ORDER BY id")
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_trashed_articles", e))?;
        rows.iter().map(Self::row_to_article).collect()
    }

    #[instrument(skip(self, now), err)]
    async fn soft_delete(&self, id: ArticleId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE articles SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.get())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("soft_delete_article", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("article {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, now), err)]
    async fn restore(&self, id: ArticleId, now: DateTime<Utc>) -> Result<Article, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE articles SET deleted_at = NULL, updated_at = $2
            WHERE id = $1 AND deleted_at IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("restore_article", e))?;

        match row {
            Some(row) => Self::row_to_article(&row),
            None => Err(StoreError::NotFound(format!("trashed article {id}"))),
        }
    }

    #[instrument(skip(self), err)]
    async fn purge(&self, id: ArticleId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1 AND deleted_at IS NOT NULL")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("purge_article", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("trashed article {id}")));
        }
        Ok(())
    }

    /// One transaction for the whole batch; any failed row rolls back every row.
    #[instrument(skip(self, articles), fields(count = articles.len()), err)]
    async fn save_all(&self, articles: &[Article]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("save_articles_begin", e))?;

        for article in articles {
            let result = sqlx::query(
                r#"
                UPDATE articles
                SET libelle = $2, description = $3, price = $4, stock = $5, updated_at = NOW()
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(article.id.get())
            .bind(&article.libelle)
            .bind(&article.description)
            .bind(price_to_sql(article.price)?)
            .bind(article.stock)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_articles", e))?;

            if result.rows_affected() == 0 {
                // Dropping `tx` rolls back.
                return Err(StoreError::NotFound(format!("article {}", article.id)));
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("save_articles_commit", e))?;
        Ok(())
    }
}
