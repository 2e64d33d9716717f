//! Policy file loading and bootstrap.
//!
//! A policy file is a TOML document seeding permission sets, roles and
//! templates:
//!
//! ```toml
//! [[permission_sets]]
//! id = "operators"
//! name = "Operators"
//! permissions = ["restart-pods", "view-logs"]
//!
//! [[roles]]
//! id = "devops-engineer"
//! name = "DevOps Engineer"
//! permissionSet = "operators"
//! maxSecurityLevel = "confidential"
//!
//! [[templates]]
//! id = "answer-default"
//! intent = "answer"
//! body = "{{document_count}} documents found."
//! ```
//!
//! Bootstrapping goes through the evaluator's administrative operations, so
//! seeded entries are validated and audited like any runtime edit.

use std::path::Path;

use rolegate_audit::ChangeKind;
use rolegate_rbac::{PermissionSetDefinition, RoleDefinition};
use rolegate_template::TemplateDefinition;
use rolegate_types::CallerId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PolicyFileError;
use crate::evaluator::PolicyEvaluator;

/// Actor recorded on policy changes made while bootstrapping.
pub const BOOTSTRAP_ACTOR: &str = "bootstrap";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyFile {
    pub permission_sets: Vec<PermissionSetDefinition>,
    pub roles: Vec<RoleDefinition>,
    pub templates: Vec<TemplateDefinition>,
}

/// Counts of entries applied by [`PolicyFile::bootstrap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permission_sets: usize,
    pub roles: usize,
    pub templates: usize,
}

impl PolicyFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyFileError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| PolicyFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_with_origin(&source, &path.display().to_string())
    }

    pub fn parse(source: &str) -> Result<Self, PolicyFileError> {
        Self::parse_with_origin(source, "<inline>")
    }

    /// Parses `source`, naming `origin` in errors.
    pub fn parse_with_origin(source: &str, origin: &str) -> Result<Self, PolicyFileError> {
        toml::from_str(source).map_err(|source| PolicyFileError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.permission_sets.is_empty() && self.roles.is_empty() && self.templates.is_empty()
    }

    /// Applies every entry to `evaluator`: permission sets, then roles, then
    /// templates.
    ///
    /// Stops at the first rejected entry. Entries applied before it stay
    /// applied, and the rejection itself is in the audit trail.
    pub fn bootstrap(&self, evaluator: &PolicyEvaluator) -> Result<BootstrapReport, PolicyFileError> {
        let actor = CallerId::new(BOOTSTRAP_ACTOR);
        let mut report = BootstrapReport::default();

        for set in &self.permission_sets {
            evaluator
                .create_permission_set(&actor, set.clone())
                .map_err(|source| PolicyFileError::Rejected {
                    change: ChangeKind::CreatePermissionSet,
                    target: set.id.clone(),
                    source,
                })?;
            report.permission_sets += 1;
        }

        for role in &self.roles {
            evaluator
                .create_role(&actor, role.clone())
                .map_err(|source| PolicyFileError::Rejected {
                    change: ChangeKind::CreateRole,
                    target: role.id.clone(),
                    source,
                })?;
            report.roles += 1;
        }

        for template in &self.templates {
            evaluator
                .create_template(&actor, template.clone())
                .map_err(|source| PolicyFileError::Rejected {
                    change: ChangeKind::CreateTemplate,
                    target: template.id.clone(),
                    source,
                })?;
            report.templates += 1;
        }

        info!(
            permission_sets = report.permission_sets,
            roles = report.roles,
            templates = report.templates,
            "Policy bootstrapped"
        );
        Ok(report)
    }
}
