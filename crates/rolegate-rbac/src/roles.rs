//! Role definitions.
//!
//! A [`RoleDefinition`] is what an administrator writes: raw permission keys,
//! a security ceiling given by name or ordinal, tag and source lists. The
//! registry validates it into a [`Role`], which is immutable once published.

use std::collections::{BTreeMap, BTreeSet};

use rolegate_types::{PermissionSetId, RoleId, SecurityLevel};
use serde::{Deserialize, Serialize};

use crate::permissions::{Permission, PermissionSet};
use crate::registry::{RegistryError, Result};

/// A validated role.
///
/// **Invariants:**
/// - `id` and `name` are non-empty
/// - every permission override is in the closed vocabulary
/// - `allowed_tags` and `denied_tags` are never the same non-empty set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,

    /// Permission set this role inherits flags from.
    pub permission_set: Option<PermissionSetId>,

    /// Role-level flags. An explicit `false` revokes an inherited flag.
    pub permission_overrides: BTreeMap<Permission, bool>,

    /// Source types the role may read. Empty means unrestricted.
    pub allowed_sources: BTreeSet<String>,

    /// Tags a document must carry at least one of. Empty means unrestricted.
    pub allowed_tags: BTreeSet<String>,

    /// Tags that exclude a document outright. Checked before `allowed_tags`.
    pub denied_tags: BTreeSet<String>,

    /// Highest security level the role may see.
    pub max_security_level: SecurityLevel,

    /// Soft-disable flag. Roles are never deleted.
    pub enabled: bool,

    pub version: u64,
}

impl Role {
    /// Computes the effective permissions given the inherited set (if any).
    ///
    /// Role-level overrides win over inherited flags in both directions.
    pub fn effective_permissions(&self, inherited: Option<&PermissionSet>) -> BTreeSet<Permission> {
        let mut effective: BTreeSet<Permission> = inherited
            .map(|set| set.permissions().clone())
            .unwrap_or_default();

        for (permission, granted) in &self.permission_overrides {
            if *granted {
                effective.insert(*permission);
            } else {
                effective.remove(permission);
            }
        }

        effective
    }

    /// Returns whether a document at `level` is within this role's ceiling.
    pub fn can_see_level(&self, level: SecurityLevel) -> bool {
        level <= self.max_security_level
    }
}

/// Security ceiling as written in a definition: a level name or its ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelSpec {
    Ordinal(i64),
    Name(String),
}

impl LevelSpec {
    fn resolve(&self) -> Result<SecurityLevel> {
        let parsed = match self {
            LevelSpec::Ordinal(ordinal) => u8::try_from(*ordinal)
                .ok()
                .and_then(SecurityLevel::from_ordinal),
            LevelSpec::Name(name) => name.parse().ok(),
        };
        parsed.ok_or_else(|| {
            RegistryError::malformed(
                "maxSecurityLevel",
                format!("'{self}' is not one of public, internal, confidential, restricted or 0-3"),
            )
        })
    }
}

impl std::fmt::Display for LevelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelSpec::Ordinal(ordinal) => write!(f, "{ordinal}"),
            LevelSpec::Name(name) => f.write_str(name),
        }
    }
}

impl From<SecurityLevel> for LevelSpec {
    fn from(level: SecurityLevel) -> Self {
        LevelSpec::Ordinal(i64::from(level.ordinal()))
    }
}

impl From<&str> for LevelSpec {
    fn from(name: &str) -> Self {
        LevelSpec::Name(name.to_string())
    }
}

impl From<i64> for LevelSpec {
    fn from(ordinal: i64) -> Self {
        LevelSpec::Ordinal(ordinal)
    }
}

/// Unvalidated role, as written by an administrator or a policy file.
///
/// # Examples
///
/// ```
/// use rolegate_rbac::RoleDefinition;
///
/// let definition = RoleDefinition::new("software-engineer", "Software Engineer")
///     .with_max_level("internal")
///     .inherit("developer")
///     .deny_tag("admin-only")
///     .revoke("edit-jobs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permission_set: Option<String>,
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
    #[serde(default)]
    pub allowed_sources: BTreeSet<String>,
    #[serde(default)]
    pub allowed_tags: BTreeSet<String>,
    #[serde(default)]
    pub denied_tags: BTreeSet<String>,
    pub max_security_level: LevelSpec,
}

impl RoleDefinition {
    /// Creates a definition with a `public` ceiling and no rules.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            permission_set: None,
            permissions: BTreeMap::new(),
            allowed_sources: BTreeSet::new(),
            allowed_tags: BTreeSet::new(),
            denied_tags: BTreeSet::new(),
            max_security_level: LevelSpec::from(SecurityLevel::Public),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_level(mut self, level: impl Into<LevelSpec>) -> Self {
        self.max_security_level = level.into();
        self
    }

    /// Inherits flags from a permission set.
    pub fn inherit(mut self, permission_set: impl Into<String>) -> Self {
        self.permission_set = Some(permission_set.into());
        self
    }

    pub fn grant(mut self, key: impl Into<String>) -> Self {
        self.permissions.insert(key.into(), true);
        self
    }

    /// Explicitly revokes a flag, including one inherited from the permission set.
    pub fn revoke(mut self, key: impl Into<String>) -> Self {
        self.permissions.insert(key.into(), false);
        self
    }

    pub fn allow_source(mut self, source: impl Into<String>) -> Self {
        self.allowed_sources.insert(source.into());
        self
    }

    pub fn allow_tag(mut self, tag: impl Into<String>) -> Self {
        self.allowed_tags.insert(tag.into());
        self
    }

    pub fn deny_tag(mut self, tag: impl Into<String>) -> Self {
        self.denied_tags.insert(tag.into());
        self
    }

    /// Validates the definition into a [`Role`].
    ///
    /// `permission_set_exists` is consulted for a referenced permission set;
    /// the registry passes a lookup into the state being written.
    pub(crate) fn validate(
        self,
        version: u64,
        permission_set_exists: impl Fn(&PermissionSetId) -> bool,
    ) -> Result<Role> {
        let id = RoleId::new(self.id.trim());
        if id.is_blank() {
            return Err(RegistryError::malformed("id", "role id is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(RegistryError::malformed(
                "name",
                format!("role '{id}' has an empty name"),
            ));
        }

        let permission_overrides = self
            .permissions
            .iter()
            .map(|(key, granted)| Ok((key.parse::<Permission>()?, *granted)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        if !self.allowed_tags.is_empty() && self.allowed_tags == self.denied_tags {
            return Err(RegistryError::malformed(
                "allowedTags",
                format!("role '{id}' allows and denies the same tags"),
            ));
        }

        let max_security_level = self.max_security_level.resolve()?;

        let permission_set = match self.permission_set {
            Some(set_id) => {
                let set_id = PermissionSetId::new(set_id.trim());
                if !permission_set_exists(&set_id) {
                    return Err(RegistryError::UnknownPermissionSet(set_id));
                }
                Some(set_id)
            }
            None => None,
        };

        Ok(Role {
            id,
            name: self.name,
            description: self.description,
            permission_set,
            permission_overrides,
            allowed_sources: self.allowed_sources,
            allowed_tags: self.allowed_tags,
            denied_tags: self.denied_tags,
            max_security_level,
            enabled: true,
            version,
        })
    }
}
