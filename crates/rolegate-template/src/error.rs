//! Error types for template parsing, rendering and storage.

use rolegate_types::{FailureKind, RoleId, TemplateId};
use thiserror::Error;

use crate::ast::VarType;

/// Template source failed to parse or type-check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed template at byte {offset}: {reason}")]
pub struct TemplateError {
    /// Byte offset into the source where the problem was detected.
    pub offset: usize,
    pub reason: String,
}

impl TemplateError {
    pub(crate) fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

/// Strict-mode rendering failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Unresolved variable '{0}'")]
    UnresolvedVariable(String),

    #[error("Type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: VarType,
        found: VarType,
    },
}

impl RenderError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RenderError::UnresolvedVariable(_) => FailureKind::UnresolvedVariable,
            RenderError::TypeMismatch { .. } => FailureKind::TypeMismatch,
        }
    }
}

/// Error type for template store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No template for the intent, neither role-specific nor global.
    #[error("No template for intent '{intent}' (role '{role}')")]
    UnknownTemplate { intent: String, role: RoleId },

    /// `update_template` of a missing id.
    #[error("Template '{0}' does not exist")]
    MissingTemplate(TemplateId),

    /// `create_template` of an existing id.
    #[error("Template '{0}' already exists")]
    DuplicateTemplate(TemplateId),

    /// Another template already serves this intent and role.
    #[error("Intent '{intent}' is already served by template '{existing}'")]
    BindingTaken { intent: String, existing: TemplateId },

    #[error("Invalid template definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Malformed(#[from] TemplateError),
}

impl StoreError {
    /// Maps the error to the coarse failure kind recorded in the audit trail.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StoreError::UnknownTemplate { .. } | StoreError::MissingTemplate(_) => {
                FailureKind::UnknownTemplate
            }
            StoreError::DuplicateTemplate(_)
            | StoreError::BindingTaken { .. }
            | StoreError::InvalidDefinition(_)
            | StoreError::Malformed(_) => FailureKind::MalformedTemplate,
        }
    }
}

/// Result type for template parsing.
pub type Result<T> = std::result::Result<T, TemplateError>;
