//! Role table loading and validation

use super::{is_identifier, normalize_role, Classification, PartitionKey, Permission};
use crate::error::{DocGateError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Built-in canonical role table
pub const DEFAULT_ROLE_TABLE: &str = include_str!("roles.yml");

/// A partition grant pattern such as `finance/confidential` or `*/public`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionGrant {
    /// `None` matches every department in the table
    pub department: Option<String>,
    /// Highest classification covered by the grant
    pub max_classification: Classification,
}

impl PartitionGrant {
    fn parse(pattern: &str) -> std::result::Result<Self, String> {
        let (department, classification) = pattern
            .split_once('/')
            .ok_or_else(|| format!("grant '{}' must look like department/classification", pattern))?;

        let department = match department.trim() {
            "*" => None,
            d => {
                let d = normalize_role(d);
                if !is_identifier(&d) {
                    return Err(format!("invalid department '{}' in grant", d));
                }
                Some(d)
            }
        };
        let max_classification = match classification.trim() {
            "*" => Classification::Restricted,
            c => c.parse()?,
        };

        Ok(Self {
            department,
            max_classification,
        })
    }

    /// Concrete partitions covered by this grant
    pub fn expand<'a>(
        &'a self,
        departments: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = PartitionKey> + 'a {
        let targets: Vec<&'a String> = match &self.department {
            Some(d) => departments.get(d).into_iter().collect(),
            None => departments.iter().collect(),
        };
        targets.into_iter().flat_map(move |department| {
            self.max_classification
                .at_or_below()
                .map(move |classification| PartitionKey {
                    department: department.clone(),
                    classification,
                })
        })
    }
}

/// One validated role entry
#[derive(Debug, Clone, Default)]
pub struct RoleDefinition {
    pub inherits: Vec<String>,
    pub permissions: BTreeSet<Permission>,
    pub partitions: Vec<PartitionGrant>,
}

/// Static role → permission table with inheritance edges
///
/// Validated on load: every inherited role exists and the inheritance graph
/// is acyclic.
#[derive(Debug, Clone)]
pub struct RoleTable {
    departments: BTreeSet<String>,
    aliases: BTreeMap<String, String>,
    roles: BTreeMap<String, RoleDefinition>,
}

#[derive(Deserialize)]
struct RawRoleTable {
    departments: Vec<String>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    roles: BTreeMap<String, RawRoleDefinition>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRoleDefinition {
    #[serde(default)]
    inherits: Vec<String>,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    partitions: Vec<String>,
}

impl RoleTable {
    /// The embedded canonical table
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(DEFAULT_ROLE_TABLE)
    }

    /// Load a role table file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML role table
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawRoleTable = serde_yaml::from_str(content)?;

        let mut departments = BTreeSet::new();
        for department in raw.departments {
            let department = normalize_role(&department);
            if !is_identifier(&department) {
                return Err(DocGateError::RoleTable(format!(
                    "invalid department name '{}'",
                    department
                )));
            }
            departments.insert(department);
        }

        let mut roles = BTreeMap::new();
        for (name, def) in raw.roles {
            let name = normalize_role(&name);
            if !is_identifier(&name) {
                return Err(DocGateError::RoleTable(format!("invalid role name '{}'", name)));
            }

            let mut partitions = Vec::with_capacity(def.partitions.len());
            for pattern in &def.partitions {
                let grant = PartitionGrant::parse(pattern)
                    .map_err(|e| DocGateError::RoleTable(format!("role '{}': {}", name, e)))?;
                if let Some(ref d) = grant.department {
                    if !departments.contains(d) {
                        return Err(DocGateError::RoleTable(format!(
                            "role '{}' grants unknown department '{}'",
                            name, d
                        )));
                    }
                }
                partitions.push(grant);
            }

            let definition = RoleDefinition {
                inherits: def.inherits.iter().map(|r| normalize_role(r)).collect(),
                permissions: def.permissions.into_iter().collect(),
                partitions,
            };
            if roles.insert(name.clone(), definition).is_some() {
                return Err(DocGateError::RoleTable(format!(
                    "role '{}' defined twice after normalization",
                    name
                )));
            }
        }

        let mut aliases = BTreeMap::new();
        for (alias, target) in raw.aliases {
            let target = normalize_role(&target);
            if !roles.contains_key(&target) {
                return Err(DocGateError::RoleTable(format!(
                    "alias '{}' points to unknown role '{}'",
                    alias, target
                )));
            }
            aliases.insert(normalize_role(&alias), target);
        }

        let table = Self {
            departments,
            aliases,
            roles,
        };
        table.check_inheritance()?;
        Ok(table)
    }

    fn check_inheritance(&self) -> Result<()> {
        for (name, def) in &self.roles {
            for parent in &def.inherits {
                if !self.roles.contains_key(parent) {
                    return Err(DocGateError::RoleTable(format!(
                        "role '{}' inherits unknown role '{}'",
                        name, parent
                    )));
                }
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            table: &'a RoleTable,
            role: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<()> {
            match marks.get(role) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(role);
                    return Err(DocGateError::RoleTable(format!(
                        "inheritance cycle: {}",
                        path.join(" -> ")
                    )));
                }
                None => {}
            }

            marks.insert(role, Mark::Visiting);
            path.push(role);
            if let Some(def) = table.roles.get(role) {
                for parent in &def.inherits {
                    visit(table, parent, marks, path)?;
                }
            }
            path.pop();
            marks.insert(role, Mark::Done);
            Ok(())
        }

        let mut marks = BTreeMap::new();
        for name in self.roles.keys() {
            visit(self, name, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Canonical role name for a raw role string, if the table knows it
    pub fn canonical(&self, raw: &str) -> Option<&str> {
        let normalized = normalize_role(raw);
        let name = self
            .aliases
            .get(&normalized)
            .map(String::as_str)
            .unwrap_or(normalized.as_str());
        self.roles.get_key_value(name).map(|(k, _)| k.as_str())
    }

    pub fn get(&self, role: &str) -> Option<&RoleDefinition> {
        self.roles.get(role)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn departments(&self) -> &BTreeSet<String> {
        &self.departments
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }
}
