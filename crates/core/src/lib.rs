//! `comptoir-core`: shared domain primitives (identifiers, errors).
//!
//! No IO lives here; every other crate in the workspace depends on it.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ArticleId, TenantId, UserId};
