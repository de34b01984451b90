//! Role → effective permission resolution

use super::{EffectivePermissionSet, RoleTable};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Resolves roles against a shared, read-only role table
///
/// Resolution is a pure function of the table and the role string: the same
/// role always yields the same set, and unknown roles yield the empty set.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    table: Arc<RoleTable>,
}

/// Human-readable breakdown of a resolved role
#[derive(Debug, Clone, Serialize)]
pub struct RoleDescription {
    pub requested: String,
    pub canonical: Option<String>,
    pub inherited_roles: BTreeSet<String>,
    #[serde(flatten)]
    pub effective: EffectivePermissionSet,
}

impl RoleResolver {
    pub fn new(table: Arc<RoleTable>) -> Self {
        Self { table }
    }

    /// Resolver over the built-in canonical table
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(Arc::new(RoleTable::builtin()?)))
    }

    pub fn table(&self) -> &RoleTable {
        &self.table
    }

    /// Canonical role plus every role it inherits from, transitively
    ///
    /// Empty for roles the table does not know.
    pub fn inheritance_closure(&self, role: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let Some(start) = self.table.canonical(role) else {
            return visited;
        };

        let mut stack = vec![start.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(def) = self.table.get(&current) {
                stack.extend(
                    def.inherits
                        .iter()
                        .filter(|parent| !visited.contains(*parent))
                        .cloned(),
                );
            }
        }
        visited
    }

    /// Expand a raw role string into its effective permission set
    pub fn resolve(&self, role: &str) -> EffectivePermissionSet {
        let mut effective = EffectivePermissionSet::default();

        for name in self.inheritance_closure(role) {
            let Some(def) = self.table.get(&name) else {
                continue;
            };
            effective.permissions.extend(def.permissions.iter().copied());
            for grant in &def.partitions {
                effective
                    .accessible_partitions
                    .extend(grant.expand(self.table.departments()));
            }
        }

        if effective.is_empty() {
            tracing::debug!(role = %role, "Role resolved to empty permission set");
        }
        effective
    }

    /// Resolution plus the inheritance chain, for display
    pub fn describe(&self, role: &str) -> RoleDescription {
        let canonical = self.table.canonical(role).map(str::to_string);
        let mut inherited_roles = self.inheritance_closure(role);
        if let Some(ref c) = canonical {
            inherited_roles.remove(c);
        }
        RoleDescription {
            requested: role.to_string(),
            canonical,
            inherited_roles,
            effective: self.resolve(role),
        }
    }
}
