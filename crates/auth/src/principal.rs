use serde::{Deserialize, Serialize};

use comptoir_core::{TenantId, UserId};

use crate::{Permission, Role, permissions_for_roles};

/// A principal's membership in a tenant: which roles it holds there and the
/// permissions those roles resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// The authenticated actor of a request, passed explicitly into every engine
/// call that needs an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Build a principal whose permissions come from the static role policy.
    pub fn from_roles(user_id: UserId, tenant_id: TenantId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            user_id,
            active_tenant_id: tenant_id,
            membership: TenantMembership {
                tenant_id,
                roles,
                permissions,
            },
        }
    }
}
