//! Token kinds, token pairs and blacklist records.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::UserView;

/// Length of generated refresh tokens (alphanumeric characters).
pub const REFRESH_TOKEN_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque refresh token and the moment it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a fresh random refresh token valid for `ttl` from `now`.
pub fn generate_refresh_token(now: DateTime<Utc>, ttl: Duration) -> RefreshToken {
    let value: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect();
    RefreshToken {
        value,
        expires_at: now + ttl,
    }
}

/// Result of a successful login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub user: UserView,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Durable denial record. Once present, the token is never honoured again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// Access tokens: the `jti` claim. Refresh tokens: the token value.
    pub token: String,
    pub kind: TokenKind,
    pub revoked_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn new(token: impl Into<String>, kind: TokenKind, revoked_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            kind,
            revoked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tokens_are_long_random_and_alphanumeric() {
        let now = Utc::now();
        let a = generate_refresh_token(now, Duration::hours(24));
        let b = generate_refresh_token(now, Duration::hours(24));

        assert_eq!(a.value.len(), REFRESH_TOKEN_LEN);
        assert!(a.value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.value, b.value);
        assert_eq!(a.expires_at, now + Duration::hours(24));
    }
}
