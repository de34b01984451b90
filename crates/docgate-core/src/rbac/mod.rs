//! Role-based access control
//!
//! Roles are resolved against a single role table (a DAG of inheritance
//! edges) into an [`EffectivePermissionSet`]: the permissions a role holds
//! and the (department, classification) partitions it may read.

mod resolver;
mod table;

pub use resolver::{RoleDescription, RoleResolver};
pub use table::{PartitionGrant, RoleDefinition, RoleTable, DEFAULT_ROLE_TABLE};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Normalize a raw role string: trim, lowercase, spaces and hyphens to `_`
pub fn normalize_role(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Whether a string is a well-formed role or department identifier
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Document sensitivity, ordered from least to most sensitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Public,
        Classification::Internal,
        Classification::Confidential,
        Classification::Restricted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Public => "public",
            Classification::Internal => "internal",
            Classification::Confidential => "confidential",
            Classification::Restricted => "restricted",
        }
    }

    /// This level and every level below it
    pub fn at_or_below(self) -> impl Iterator<Item = Classification> {
        Self::ALL.into_iter().filter(move |c| *c <= self)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Classification::Public),
            "internal" => Ok(Classification::Internal),
            "confidential" => Ok(Classification::Confidential),
            "restricted" => Ok(Classification::Restricted),
            other => Err(format!("unknown classification '{}'", other)),
        }
    }
}

/// A (department, classification) data partition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey {
    pub department: String,
    pub classification: Classification,
}

impl PartitionKey {
    /// Build a key, normalizing and validating the department
    pub fn new(department: &str, classification: Classification) -> Result<Self, String> {
        let department = normalize_role(department);
        if !is_identifier(&department) {
            return Err(format!("invalid department '{}'", department));
        }
        Ok(Self {
            department,
            classification,
        })
    }

    /// Parse raw metadata fields
    pub fn parse(department: &str, classification: &str) -> Result<Self, String> {
        Self::new(department, classification.parse()?)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.department, self.classification)
    }
}

impl FromStr for PartitionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (department, classification) = s
            .split_once('/')
            .ok_or_else(|| format!("partition '{}' must look like department/classification", s))?;
        Self::parse(department, classification)
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.to_string()
    }
}

/// Capabilities a role may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Ask questions against the document index
    SearchDocs,
    /// Read the audit trail
    ViewAuditLog,
    /// Administer user accounts
    ManageUsers,
    /// See service metrics
    ViewAdminMetrics,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::SearchDocs => "search_docs",
            Permission::ViewAuditLog => "view_audit_log",
            Permission::ManageUsers => "manage_users",
            Permission::ViewAdminMetrics => "view_admin_metrics",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions and readable partitions derived from a role
///
/// Computed once per request and never mutated afterwards. The empty set
/// means deny everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissionSet {
    pub permissions: BTreeSet<Permission>,
    pub accessible_partitions: BTreeSet<PartitionKey>,
}

impl EffectivePermissionSet {
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.accessible_partitions.is_empty()
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Whether the role may query documents at all
    pub fn can_search(&self) -> bool {
        self.has(Permission::SearchDocs) && !self.accessible_partitions.is_empty()
    }

    pub fn allows(&self, partition: &PartitionKey) -> bool {
        self.accessible_partitions.contains(partition)
    }

    /// Distinct departments among the accessible partitions
    pub fn departments(&self) -> BTreeSet<&str> {
        self.accessible_partitions
            .iter()
            .map(|p| p.department.as_str())
            .collect()
    }
}
