//! Password hashing (bcrypt).

use std::sync::OnceLock;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(#[from] bcrypt::BcryptError);

/// bcrypt hasher with a configurable work factor.
#[derive(Debug)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: OnceLock<String>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy_hash: OnceLock::new(),
        }
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Returns `Ok(false)` on mismatch; `Err` only for unparsable hashes.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        Ok(bcrypt::verify(password, hash)?)
    }

    /// Burn one verification worth of time for a login that matched no user,
    /// so response timing does not reveal which logins exist.
    pub fn verify_dummy(&self, password: &str) {
        let hash = self
            .dummy_hash
            .get_or_init(|| bcrypt::hash("comptoir-dummy-password", self.cost).unwrap_or_default());
        let _ = bcrypt::verify(password, hash);
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}
