#![allow(clippy::match_same_arms)]
//! Permission vocabulary for roles.
//!
//! The vocabulary is closed: every flag a role or permission set carries
//! must be one of the [`Permission`] variants. Unknown keys are rejected at
//! write time rather than silently ignored.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use rolegate_types::PermissionSetId;
use serde::{Deserialize, Serialize};

use crate::registry::{RegistryError, Result};

/// Permission flag that can be granted to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    /// Restart pods and other workloads.
    RestartPods,

    /// Edit CI/CD jobs and pipelines.
    EditJobs,

    /// Read application and platform logs.
    ViewLogs,

    /// Read or rotate secrets.
    ///
    /// **Security Impact:** high-risk, grants access to credentials.
    AccessSecrets,

    /// Change infrastructure definitions.
    ModifyInfrastructure,

    /// Read the policy audit trail.
    ViewAuditLogs,

    /// Create and edit roles, permission sets and templates.
    ///
    /// **Security Impact:** high-risk, can escalate privileges.
    ManagePolicies,
}

impl Permission {
    /// Every permission in the vocabulary.
    pub const ALL: [Permission; 7] = [
        Permission::RestartPods,
        Permission::EditJobs,
        Permission::ViewLogs,
        Permission::AccessSecrets,
        Permission::ModifyInfrastructure,
        Permission::ViewAuditLogs,
        Permission::ManagePolicies,
    ];

    /// Returns the canonical kebab-case key.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::RestartPods => "restart-pods",
            Permission::EditJobs => "edit-jobs",
            Permission::ViewLogs => "view-logs",
            Permission::AccessSecrets => "access-secrets",
            Permission::ModifyInfrastructure => "modify-infrastructure",
            Permission::ViewAuditLogs => "view-audit-logs",
            Permission::ManagePolicies => "manage-policies",
        }
    }

    /// Returns the boolean variable name exposed to templates (`can_restart_pods`).
    pub fn context_key(self) -> String {
        format!("can_{}", self.as_str().replace('-', "_"))
    }

    /// Returns whether this permission is high-risk.
    pub fn is_high_risk(self) -> bool {
        matches!(
            self,
            Permission::AccessSecrets
                | Permission::ModifyInfrastructure
                | Permission::ManagePolicies
        )
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = RegistryError;

    /// Parses a canonical key or one of the legacy `canX` aliases.
    fn from_str(key: &str) -> Result<Self> {
        let permission = match key {
            "restart-pods" | "canRestartPod" => Permission::RestartPods,
            "edit-jobs" | "canEditJenkinsJob" => Permission::EditJobs,
            "view-logs" | "canViewLogs" => Permission::ViewLogs,
            "access-secrets" | "canAccessSecrets" => Permission::AccessSecrets,
            "modify-infrastructure" | "canModifyInfra" => Permission::ModifyInfrastructure,
            "view-audit-logs" | "canViewAuditLogs" => Permission::ViewAuditLogs,
            "manage-policies" | "canManagePolicies" => Permission::ManagePolicies,
            other => {
                return Err(RegistryError::malformed(
                    "permissions",
                    format!("unknown permission key '{other}'"),
                ));
            }
        };
        Ok(permission)
    }
}

/// Reusable, named bundle of permissions a role may inherit from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub id: PermissionSetId,
    pub name: String,
    pub description: String,
    permissions: BTreeSet<Permission>,
    pub version: u64,
}

impl PermissionSet {
    /// Returns whether this set contains the given permission.
    pub fn contains(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Returns all permissions in the set, in vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }
}

/// Unvalidated permission set, as written by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSetDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl PermissionSetDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            permissions: Vec::new(),
        }
    }

    /// Adds a permission key (builder pattern). Validated on write.
    pub fn grant(mut self, key: impl Into<String>) -> Self {
        self.permissions.push(key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Validates the definition against the closed vocabulary.
    pub(crate) fn validate(self, version: u64) -> Result<PermissionSet> {
        let id = PermissionSetId::new(self.id.trim());
        if id.is_blank() {
            return Err(RegistryError::malformed("id", "permission set id is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(RegistryError::malformed(
                "name",
                format!("permission set '{id}' has an empty name"),
            ));
        }

        let permissions = self
            .permissions
            .iter()
            .map(|key| key.parse::<Permission>())
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(PermissionSet {
            id,
            name: self.name,
            description: self.description,
            permissions,
            version,
        })
    }
}
