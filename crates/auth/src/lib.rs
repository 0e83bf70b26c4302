//! `comptoir-auth`: authentication/authorization boundary.
//!
//! Token formats, password hashing and RBAC policy live here. Nothing in this
//! crate touches storage or HTTP; the token lifecycle orchestration is in
//! `comptoir-infra`.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;
pub mod user;

pub use authorize::{AuthzError, authorize, authorize_in_tenant};
pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use jwt::{AccessTokenIssuer, Hs256Jwt, IssuedAccessToken, JwtValidator, TokenIssueError};
pub use password::{PasswordError, PasswordHasher};
pub use permissions::Permission;
pub use principal::{Principal, TenantMembership};
pub use roles::{Role, permissions_for_role, permissions_for_roles};
pub use token::{BlacklistEntry, RefreshToken, TokenKind, TokenPair, generate_refresh_token};
pub use user::{User, UserStatus, UserView};
