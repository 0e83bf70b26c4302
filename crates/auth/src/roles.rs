use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles stay opaque strings on tokens and user records; [`permissions_for_role`]
/// is the single place that turns them into permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const MANAGER: Role = Role(Cow::Borrowed("manager"));
    pub const CLIENT: Role = Role(Cow::Borrowed("client"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission policy.
///
/// Unknown roles grant nothing.
pub fn permissions_for_role(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::WILDCARD],
        "manager" => vec![
            Permission::ARTICLES_READ,
            Permission::ARTICLES_CREATE,
            Permission::ARTICLES_UPDATE,
            Permission::ARTICLES_UPDATE_MANY,
            Permission::ARTICLES_DELETE,
        ],
        "client" => vec![Permission::ARTICLES_READ],
        _ => Vec::new(),
    }
}

/// Union of the permissions granted by every role, without duplicates.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for perm in roles.iter().flat_map(permissions_for_role) {
        if !out.contains(&perm) {
            out.push(perm);
        }
    }
    out
}
