//! Token lifecycle orchestration.
//!
//! `AuthEngine` composes the password hasher, the JWT issuer/validator and the
//! three stores (users, blacklist, issued access tokens).
//!
//! ```text
//! login:   verify credentials → rotate refresh token on user → issue access token (recorded)
//! refresh: find user by refresh token → swap it for a new one (only if unchanged)
//!          → blacklist it → blacklist + revoke current access token → issue access token
//! logout:  blacklist access token (upsert) → revoke it (best effort)
//! ```
//!
//! The swap is what makes a refresh token single-use: of two concurrent
//! refreshes with the same token, only one gets past it.
//!
//! The blacklist is the authority on revocation. Revoking in the access token
//! repository only follows it, and a failure there is logged, never returned.
//!
//! Every operation takes `now` from the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use comptoir_auth::{
    AccessClaims, AccessTokenIssuer, BlacklistEntry, Hs256Jwt, JwtValidator, PasswordHasher, Principal,
    RefreshToken, TokenIssueError, TokenKind, TokenPair, User, generate_refresh_token,
};

use crate::store::{AccessTokenRepository, IssuedTokenRecord, StoreError, TokenBlacklist, UserStore};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("invalid access token")]
    InvalidAccessToken,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("account is inactive")]
    AccountInactive,

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("token issuance failed: {0}")]
    Token(#[from] TokenIssueError),
}

/// An authenticated request: the token's claims, the current user record and
/// the principal used for authorization decisions.
#[derive(Debug, Clone)]
pub struct Session {
    pub claims: AccessClaims,
    pub user: User,
    pub principal: Principal,
}

pub struct AuthEngine {
    users: Arc<dyn UserStore>,
    blacklist: Arc<dyn TokenBlacklist>,
    access_tokens: Arc<dyn AccessTokenRepository>,
    jwt: Hs256Jwt,
    hasher: PasswordHasher,
    refresh_ttl: Duration,
}

impl AuthEngine {
    pub fn new(
        users: Arc<dyn UserStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        access_tokens: Arc<dyn AccessTokenRepository>,
        jwt: Hs256Jwt,
        hasher: PasswordHasher,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            blacklist,
            access_tokens,
            jwt,
            hasher,
            refresh_ttl,
        }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    #[instrument(skip(self, password, now), err)]
    pub async fn login(&self, login: &str, password: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let Some(mut user) = self.users.find_by_login(login).await? else {
            self.hasher.verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };

        match self.hasher.verify(password, &user.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::InvalidCredentials),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "stored password hash is unusable");
                return Err(AuthError::InvalidCredentials);
            }
        }

        if !user.is_active() {
            return Err(AuthError::AccountInactive);
        }

        let refresh = self.rotate_refresh(&mut user, None, now).await?;
        let pair = self.issue_pair(user, refresh, now).await?;
        info!(user_id = %pair.user.id, "login succeeded");
        Ok(pair)
    }

    #[instrument(skip_all, err)]
    pub async fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }
        if self.blacklist.contains(TokenKind::Refresh, refresh_token).await? {
            return Err(AuthError::InvalidRefreshToken);
        }
        let Some(mut user) = self.users.find_by_refresh_token(refresh_token).await? else {
            return Err(AuthError::InvalidRefreshToken);
        };
        if !user.refresh_token_live_at(now) {
            return Err(AuthError::InvalidRefreshToken);
        }
        if !user.is_active() {
            return Err(AuthError::AccountInactive);
        }

        let current_access = self.access_tokens.latest_active_for_user(user.id).await?;
        let refresh = self.rotate_refresh(&mut user, Some(refresh_token), now).await?;

        self.blacklist
            .upsert(BlacklistEntry::new(refresh_token, TokenKind::Refresh, now))
            .await?;

        if let Some(record) = current_access {
            self.blacklist
                .upsert(BlacklistEntry::new(record.jti.to_string(), TokenKind::Access, now))
                .await?;
            self.revoke_quietly(record.jti).await;
        }

        let pair = self.issue_pair(user, refresh, now).await?;
        info!(user_id = %pair.user.id, "refresh token rotated");
        Ok(pair)
    }

    /// Blacklist the session's access token. Repeating the call only moves the
    /// entry's `revoked_at`.
    #[instrument(skip_all, fields(user_id = %claims.sub), err)]
    pub async fn logout(&self, claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), AuthError> {
        self.blacklist
            .upsert(BlacklistEntry::new(claims.token_key(), TokenKind::Access, now))
            .await?;
        self.revoke_quietly(claims.jti).await;
        info!("logged out");
        Ok(())
    }

    pub async fn is_blacklisted(&self, kind: TokenKind, token_key: &str) -> Result<bool, AuthError> {
        Ok(self.blacklist.contains(kind, token_key).await?)
    }

    /// Signature and validity window only. Used where a blacklisted token must
    /// still be accepted (logout).
    pub fn verify_bearer(&self, bearer: &str, now: DateTime<Utc>) -> Result<AccessClaims, AuthError> {
        self.jwt
            .validate(bearer, now)
            .map_err(|_| AuthError::InvalidAccessToken)
    }

    /// Full request authentication: signature and window, blacklist,
    /// revocation, and an existing active user of the token's tenant.
    pub async fn authenticate(&self, bearer: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let claims = self.verify_bearer(bearer, now)?;

        if self.is_blacklisted(TokenKind::Access, &claims.token_key()).await? {
            return Err(AuthError::TokenRevoked);
        }
        if self.access_tokens.is_revoked(claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        let Some(user) = self.users.find_by_id(claims.sub).await? else {
            return Err(AuthError::InvalidAccessToken);
        };
        if user.tenant_id != claims.tenant_id {
            return Err(AuthError::InvalidAccessToken);
        }
        if !user.is_active() {
            return Err(AuthError::AccountInactive);
        }

        let principal = Principal::from_roles(user.id, user.tenant_id, vec![user.role.clone()]);
        Ok(Session {
            claims,
            user,
            principal,
        })
    }

    /// Store a new refresh token on the user. With `spent`, the stored token
    /// must still be that one; losing the race reads as an invalid token.
    async fn rotate_refresh(
        &self,
        user: &mut User,
        spent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, AuthError> {
        let refresh = generate_refresh_token(now, self.refresh_ttl);
        match self.users.set_refresh_token(user.id, spent, &refresh, now).await {
            Ok(()) => {}
            Err(StoreError::Stale(_)) => {
                warn!(user_id = %user.id, "refresh token already rotated");
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => return Err(e.into()),
        }
        user.rotate_refresh_token(&refresh, now);
        Ok(refresh)
    }

    async fn issue_pair(&self, user: User, refresh: RefreshToken, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let access = self.jwt.issue(&user, now)?;
        self.access_tokens
            .record(IssuedTokenRecord {
                jti: access.claims.jti,
                user_id: user.id,
                issued_at: access.claims.issued_at(),
                expires_at: access.claims.expires_at(),
                revoked: false,
            })
            .await?;

        Ok(TokenPair {
            user: user.view(),
            expires_in: access.expires_in_seconds(),
            access_token: access.token,
            refresh_token: refresh.value,
            token_type: "Bearer",
        })
    }

    async fn revoke_quietly(&self, jti: uuid::Uuid) {
        if let Err(e) = self.access_tokens.revoke(jti).await {
            warn!(%jti, error = %e, "access token revocation failed; blacklist entry stands");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use comptoir_auth::{Role, UserStatus};
    use comptoir_core::{TenantId, UserId};
    use uuid::Uuid;

    use super::*;
    use crate::store::{InMemoryAccessTokenRepository, InMemoryTokenBlacklist, InMemoryUserStore};

    struct Fixture {
        engine: AuthEngine,
        users: Arc<InMemoryUserStore>,
        blacklist: Arc<InMemoryTokenBlacklist>,
        tokens: Arc<dyn AccessTokenRepository>,
        user_id: UserId,
    }

    async fn fixture_with(status: UserStatus, tokens: Arc<dyn AccessTokenRepository>) -> Fixture {
        fixture_over(status, tokens, |users| users).await
    }

    /// Builds the engine over `wrap(users)`; the fixture keeps the plain store.
    async fn fixture_over(
        status: UserStatus,
        tokens: Arc<dyn AccessTokenRepository>,
        wrap: impl FnOnce(Arc<InMemoryUserStore>) -> Arc<dyn UserStore>,
    ) -> Fixture {
        let users = Arc::new(InMemoryUserStore::new());
        let blacklist = Arc::new(InMemoryTokenBlacklist::new());
        let hasher = PasswordHasher::new(4);

        let mut user = User::new(
            TenantId::new(),
            "aminata",
            "Aminata",
            "Sow",
            hasher.hash("passer123").unwrap(),
            Role::MANAGER,
        )
        .unwrap();
        user.status = status;
        let user_id = user.id;
        users.insert(user).await.unwrap();

        let engine = AuthEngine::new(
            wrap(users.clone()),
            blacklist.clone(),
            tokens.clone(),
            Hs256Jwt::new(b"test-secret", Duration::minutes(5)),
            hasher,
            Duration::hours(24),
        );
        Fixture {
            engine,
            users,
            blacklist,
            tokens,
            user_id,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(UserStatus::Active, Arc::new(InMemoryAccessTokenRepository::new())).await
    }

    #[tokio::test]
    async fn login_returns_a_bearer_pair_and_stores_refresh_token() {
        let f = fixture().await;
        let now = Utc::now();
        let pair = f.engine.login("aminata", "passer123", now).await.unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 300);
        assert_eq!(pair.refresh_token.len(), 80);

        let stored = f.users.find_by_id(f.user_id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(pair.refresh_token.as_str()));
        assert!(f.tokens.latest_active_for_user(f.user_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_login_and_wrong_password_look_the_same() {
        let f = fixture().await;
        let now = Utc::now();
        let unknown = f.engine.login("nobody", "passer123", now).await.unwrap_err();
        let wrong = f.engine.login("aminata", "nope", now).await.unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn inactive_user_cannot_log_in() {
        let f = fixture_with(UserStatus::Inactive, Arc::new(InMemoryAccessTokenRepository::new())).await;
        let err = f.engine.login("aminata", "passer123", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));
    }

    #[tokio::test]
    async fn refresh_rotates_and_kills_previous_tokens() {
        let f = fixture().await;
        let now = Utc::now();
        let first = f.engine.login("aminata", "passer123", now).await.unwrap();
        let second = f.engine.refresh(&first.refresh_token, now).await.unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);

        // Old refresh token is single-use.
        let err = f.engine.refresh(&first.refresh_token, now).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));

        // Old access token is dead, new one works.
        let err = f.engine.authenticate(&first.access_token, now).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
        let session = f.engine.authenticate(&second.access_token, now).await.unwrap();
        assert_eq!(session.user.id, f.user_id);

        assert_eq!(f.blacklist.len(), 2);
    }

    /// Hands control back to the scheduler after each refresh token lookup so
    /// that two concurrent refreshes both read the user before either writes.
    struct YieldingUsers(Arc<InMemoryUserStore>);

    #[async_trait]
    impl UserStore for YieldingUsers {
        async fn insert(&self, user: User) -> Result<(), StoreError> {
            self.0.insert(user).await
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.0.find_by_id(id).await
        }

        async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
            self.0.find_by_login(login).await
        }

        async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError> {
            let found = self.0.find_by_refresh_token(token).await;
            tokio::task::yield_now().await;
            found
        }

        async fn set_refresh_token(
            &self,
            id: UserId,
            expected: Option<&str>,
            token: &RefreshToken,
            now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.0.set_refresh_token(id, expected, token, now).await
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_with_one_token_yield_one_pair() {
        let f = fixture_over(
            UserStatus::Active,
            Arc::new(InMemoryAccessTokenRepository::new()),
            |users| Arc::new(YieldingUsers(users)),
        )
        .await;
        let now = Utc::now();
        let pair = f.engine.login("aminata", "passer123", now).await.unwrap();

        let (a, b) = tokio::join!(
            f.engine.refresh(&pair.refresh_token, now),
            f.engine.refresh(&pair.refresh_token, now),
        );

        let (won, lost) = match (a, b) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
            (a, b) => panic!("expected exactly one successful refresh, got {a:?} and {b:?}"),
        };
        assert!(matches!(lost, AuthError::InvalidRefreshToken));

        let stored = f.users.find_by_id(f.user_id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(won.refresh_token.as_str()));
        assert!(f.engine.authenticate(&won.access_token, now).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_rejects_empty_unknown_and_expired_tokens() {
        let f = fixture().await;
        let now = Utc::now();
        let pair = f.engine.login("aminata", "passer123", now).await.unwrap();

        for token in ["", "not-a-real-token"] {
            let err = f.engine.refresh(token, now).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidRefreshToken));
        }

        let later = now + Duration::hours(25);
        let err = f.engine.refresh(&pair.refresh_token, later).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_blacklists_once() {
        let f = fixture().await;
        let now = Utc::now();
        let pair = f.engine.login("aminata", "passer123", now).await.unwrap();
        let claims = f.engine.verify_bearer(&pair.access_token, now).unwrap();

        f.engine.logout(&claims, now).await.unwrap();
        f.engine.logout(&claims, now + Duration::seconds(1)).await.unwrap();

        assert_eq!(f.blacklist.len(), 1);
        assert!(f.engine.is_blacklisted(TokenKind::Access, &claims.token_key()).await.unwrap());
        assert!(matches!(
            f.engine.authenticate(&pair.access_token, now).await,
            Err(AuthError::TokenRevoked)
        ));
        // Signature and window still check out.
        assert!(f.engine.verify_bearer(&pair.access_token, now).is_ok());
    }

    #[tokio::test]
    async fn expired_access_token_is_refused() {
        let f = fixture().await;
        let now = Utc::now();
        let pair = f.engine.login("aminata", "passer123", now).await.unwrap();
        let err = f
            .engine
            .authenticate(&pair.access_token, now + Duration::minutes(6))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAccessToken));
    }

    struct RevocationFails(InMemoryAccessTokenRepository);

    #[async_trait]
    impl AccessTokenRepository for RevocationFails {
        async fn record(&self, token: IssuedTokenRecord) -> Result<(), StoreError> {
            self.0.record(token).await
        }

        async fn latest_active_for_user(&self, user_id: UserId) -> Result<Option<IssuedTokenRecord>, StoreError> {
            self.0.latest_active_for_user(user_id).await
        }

        async fn revoke(&self, _jti: Uuid) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk on fire".into()))
        }

        async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
            self.0.is_revoked(jti).await
        }
    }

    #[tokio::test]
    async fn failed_revocation_does_not_fail_logout_and_blacklist_still_wins() {
        let f = fixture_with(
            UserStatus::Active,
            Arc::new(RevocationFails(InMemoryAccessTokenRepository::new())),
        )
        .await;
        let now = Utc::now();
        let pair = f.engine.login("aminata", "passer123", now).await.unwrap();
        let claims = f.engine.verify_bearer(&pair.access_token, now).unwrap();

        f.engine.logout(&claims, now).await.unwrap();
        assert!(matches!(
            f.engine.authenticate(&pair.access_token, now).await,
            Err(AuthError::TokenRevoked)
        ));
    }
}
