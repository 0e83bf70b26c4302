//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use comptoir_core::{DomainError, DomainResult, TenantId, UserId};

use crate::{RefreshToken, Role};

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Can authenticate.
    #[default]
    Active,
    /// Kept on record but refused at login and refresh.
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            _ => None,
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A user account as stored.
///
/// # Invariants
/// - `login` is non-empty and unique (uniqueness is enforced by the store).
/// - At most one live refresh token: setting a new one replaces the old value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        tenant_id: TenantId,
        login: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        password_hash: String,
        role: Role,
    ) -> DomainResult<Self> {
        let login = login.into().trim().to_string();
        if login.is_empty() {
            return Err(DomainError::validation("login cannot be empty"));
        }
        if login.len() > 255 {
            return Err(DomainError::validation("login is longer than 255 characters"));
        }
        if password_hash.is_empty() {
            return Err(DomainError::validation("password hash cannot be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: UserId::new(),
            tenant_id,
            login,
            first_name: first_name.into().trim().to_string(),
            last_name: last_name.into().trim().to_string(),
            password_hash,
            role,
            status: UserStatus::Active,
            refresh_token: None,
            refresh_token_expires_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Replace the live refresh token (the previous one stops matching).
    pub fn rotate_refresh_token(&mut self, token: &RefreshToken, now: DateTime<Utc>) {
        self.refresh_token = Some(token.value.clone());
        self.refresh_token_expires_at = Some(token.expires_at);
        self.updated_at = now;
    }

    /// Whether the stored refresh token is still within its lifetime.
    ///
    /// A token without a recorded expiry is treated as expired.
    pub fn refresh_token_live_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.refresh_token, self.refresh_token_expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }

    /// Public projection without secrets.
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            tenant_id: self.tenant_id,
            login: self.login.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role.clone(),
            status: self.status,
        }
    }
}

/// What API responses show of a user: no password hash, no refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub status: UserStatus,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
