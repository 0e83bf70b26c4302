use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, `"<resource>.<action>"` (e.g. `"articles.update"`).
///
/// `"*"` grants everything; `"articles.*"` grants every action on articles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    pub const ARTICLES_READ: Permission = Permission(Cow::Borrowed("articles.read"));
    pub const ARTICLES_UPDATE: Permission = Permission(Cow::Borrowed("articles.update"));
    pub const ARTICLES_UPDATE_MANY: Permission = Permission(Cow::Borrowed("articles.update_many"));
    pub const ARTICLES_CREATE: Permission = Permission(Cow::Borrowed("articles.create"));
    pub const ARTICLES_DELETE: Permission = Permission(Cow::Borrowed("articles.delete"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether holding `self` satisfies a check for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        match self.as_str() {
            "*" => true,
            held => match held.strip_suffix(".*") {
                Some(resource) => required
                    .as_str()
                    .split_once('.')
                    .is_some_and(|(r, _)| r == resource),
                None => held == required.as_str(),
            },
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
