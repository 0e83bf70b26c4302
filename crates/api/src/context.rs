use comptoir_auth::{AccessClaims, Principal, User};

/// Authenticated actor of a request (fully authenticated routes only).
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    principal: Principal,
    user: User,
}

impl PrincipalContext {
    pub fn new(principal: Principal, user: User) -> Self {
        Self { principal, user }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}

/// Verified claims of the presented bearer token.
#[derive(Debug, Clone)]
pub struct BearerClaims(pub AccessClaims);
