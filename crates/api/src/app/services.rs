use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use comptoir_auth::{Hs256Jwt, PasswordHasher, Role, User};
use comptoir_core::TenantId;
use comptoir_infra::store::{
    AccessTokenRepository, ArticleStore, InMemoryAccessTokenRepository, InMemoryArticleStore, InMemoryTokenBlacklist,
    InMemoryUserStore, PostgresAccessTokenRepository, PostgresArticleStore, PostgresTokenBlacklist, PostgresUserStore,
    TokenBlacklist, UserStore,
};
use comptoir_infra::{AppConfig, ArticleCatalog, AuthEngine, BatchUpdateEngine, SeedAdmin};

/// The four stores behind the engines, from one backend.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub blacklist: Arc<dyn TokenBlacklist>,
    pub access_tokens: Arc<dyn AccessTokenRepository>,
    pub articles: Arc<dyn ArticleStore>,
}

impl Stores {
    /// In-memory stores (dev/test).
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserStore::new()),
            blacklist: Arc::new(InMemoryTokenBlacklist::new()),
            access_tokens: Arc::new(InMemoryAccessTokenRepository::new()),
            articles: Arc::new(InMemoryArticleStore::new()),
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            users: Arc::new(PostgresUserStore::new(pool.clone())),
            blacklist: Arc::new(PostgresTokenBlacklist::new(pool.clone())),
            access_tokens: Arc::new(PostgresAccessTokenRepository::new(pool.clone())),
            articles: Arc::new(PostgresArticleStore::new(pool)),
        }
    }
}

#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthEngine>,
    pub batch: Arc<BatchUpdateEngine>,
    pub catalog: Arc<ArticleCatalog>,
    pub users: Arc<dyn UserStore>,
    pub articles: Arc<dyn ArticleStore>,
}

impl AppServices {
    pub fn new(config: &AppConfig, stores: Stores) -> Self {
        let auth = AuthEngine::new(
            stores.users.clone(),
            stores.blacklist,
            stores.access_tokens,
            Hs256Jwt::new(config.jwt_secret.as_bytes(), config.access_token_ttl),
            PasswordHasher::new(config.bcrypt_cost),
            config.refresh_token_ttl,
        );
        Self {
            auth: Arc::new(auth),
            batch: Arc::new(BatchUpdateEngine::new(stores.articles.clone())),
            catalog: Arc::new(ArticleCatalog::new(stores.articles.clone())),
            users: stores.users,
            articles: stores.articles,
        }
    }

    /// Create the bootstrap admin in a fresh tenant unless the login exists.
    pub async fn seed_admin(&self, seed: &SeedAdmin) -> anyhow::Result<()> {
        if self.users.find_by_login(&seed.login).await?.is_some() {
            tracing::info!(login = %seed.login, "seed admin already present");
            return Ok(());
        }

        let hash = self.auth.hasher().hash(&seed.password)?;
        let user = User::new(TenantId::new(), seed.login.as_str(), "Admin", "", hash, Role::ADMIN)?;
        let tenant_id = user.tenant_id;
        self.users.insert(user).await?;
        tracing::info!(login = %seed.login, %tenant_id, "seed admin created");
        Ok(())
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let stores = if config.use_persistent_stores {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is required for persistent stores")?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .context("failed to connect to Postgres")?;
        tracing::info!("using Postgres stores");
        Stores::postgres(pool)
    } else {
        tracing::info!("using in-memory stores");
        Stores::in_memory()
    };

    let services = AppServices::new(config, stores);
    if let Some(seed) = &config.seed_admin {
        services.seed_admin(seed).await?;
    }
    Ok(services)
}
