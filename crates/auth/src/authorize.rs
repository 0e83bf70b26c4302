use thiserror::Error;

use comptoir_core::TenantId;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Check that `principal` holds `required` within its active tenant.
///
/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.grants(required));

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Authorization decision keyed by (actor, permission, resource tenant).
///
/// A resource owned by another tenant is refused even for wildcard holders.
pub fn authorize_in_tenant(
    principal: &Principal,
    required: &Permission,
    resource_tenant: TenantId,
) -> Result<(), AuthzError> {
    if resource_tenant != principal.active_tenant_id {
        return Err(AuthzError::TenantMismatch);
    }
    authorize(principal, required)
}
