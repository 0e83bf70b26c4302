//! HS256 access tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::{AccessClaims, TokenValidationError, User, validate_claims};

/// Verifies bearer tokens presented on requests.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenValidationError>;
}

/// Mints access tokens for users.
pub trait AccessTokenIssuer: Send + Sync {
    fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedAccessToken, TokenIssueError>;
}

/// A freshly signed access token together with its claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedAccessToken {
    pub token: String,
    pub claims: AccessClaims,
}

impl IssuedAccessToken {
    pub fn expires_in_seconds(&self) -> i64 {
        self.claims.exp - self.claims.iat
    }
}

#[derive(Debug, Error)]
#[error("failed to sign access token: {0}")]
pub struct TokenIssueError(#[from] jsonwebtoken::errors::Error);

/// Shared-secret JWT codec (HS256) implementing both issuing and validation.
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Hs256Jwt {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    fn validation() -> Validation {
        // Expiry is checked against the caller's clock in `validate_claims`.
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = false;
        v.leeway = 0;
        v.set_required_spec_claims(&["exp", "sub"]);
        v
    }
}

impl AccessTokenIssuer for Hs256Jwt {
    fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedAccessToken, TokenIssueError> {
        let claims = AccessClaims {
            sub: user.id,
            tenant_id: user.tenant_id,
            roles: vec![user.role.clone()],
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedAccessToken { token, claims })
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &Self::validation())
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
