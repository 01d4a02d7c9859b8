use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bastion_core::Actor;

use crate::traits::PermissionChecker;

/// Resolves permissions from an actor's direct grants plus static role grants.
///
/// Grants support two wildcard forms: `*` matches every permission and
/// `content.*` matches any permission under the `content.` prefix.
#[derive(Debug, Clone, Default)]
pub struct RolePermissionChecker {
    roles: HashMap<String, BTreeSet<String>>,
}

impl RolePermissionChecker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `permission` to every actor holding `role`.
    #[must_use]
    pub fn grant(mut self, role: impl Into<String>, permission: impl Into<String>) -> Self {
        self.roles
            .entry(role.into())
            .or_default()
            .insert(permission.into());
        self
    }

    fn grants<'a>(&'a self, actor: &'a Actor) -> impl Iterator<Item = &'a String> {
        actor.permissions.iter().chain(
            actor
                .roles
                .iter()
                .filter_map(|role| self.roles.get(role))
                .flatten(),
        )
    }

    /// Whether `actor` holds `permission` directly or through a role.
    #[must_use]
    pub fn allows(&self, actor: &Actor, permission: &str) -> bool {
        self.grants(actor).any(|grant| grant_matches(grant, permission))
    }
}

#[async_trait]
impl PermissionChecker for RolePermissionChecker {
    async fn has_permissions(&self, actor: &Actor, permissions: &BTreeSet<String>) -> bool {
        permissions
            .iter()
            .all(|permission| self.allows(actor, permission))
    }
}

fn grant_matches(grant: &str, permission: &str) -> bool {
    if grant == "*" || grant == permission {
        return true;
    }
    match grant.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => {
            permission.len() > prefix.len() && permission.starts_with(prefix)
        }
        _ => false,
    }
}
