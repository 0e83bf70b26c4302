//! Repository boundary: async traits returning plain records, with an
//! in-memory implementation for dev/tests and a Postgres one for deployments.

pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use in_memory::{InMemoryAccessTokenRepository, InMemoryArticleStore, InMemoryTokenBlacklist, InMemoryUserStore};
pub use postgres::{PostgresAccessTokenRepository, PostgresArticleStore, PostgresTokenBlacklist, PostgresUserStore};
pub use traits::{AccessTokenRepository, ArticleStore, IssuedTokenRecord, StoreError, TokenBlacklist, UserStore};
