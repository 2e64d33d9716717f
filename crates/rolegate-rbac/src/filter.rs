//! Document filter engine.
//!
//! Applies a resolved role's rules to the retriever's candidate list. The
//! engine never re-ranks: included documents keep their input order, and
//! every candidate gets exactly one [`FilterDecision`].

use std::collections::BTreeMap;

use rolegate_types::{Document, FailureKind, FilterDecision, FilterReason, RoleId};
use thiserror::Error;
use tracing::{info, warn};

use crate::registry::{RegistryError, RegistrySnapshot, ResolvedRole};
use crate::roles::Role;

/// Error type for filtering by role id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Unknown role '{0}'")]
    UnknownRole(RoleId),

    #[error("Role '{0}' is disabled")]
    RoleDisabled(RoleId),
}

impl FilterError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FilterError::UnknownRole(_) => FailureKind::UnknownRole,
            FilterError::RoleDisabled(_) => FailureKind::RoleDisabled,
        }
    }
}

/// Result type for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Decides the reason code for a single document.
///
/// Checks short-circuit in precedence order:
/// 1. security ceiling
/// 2. denied tags (deny always wins over the allowlist)
/// 3. tag allowlist, only when non-empty
/// 4. source allowlist, only when non-empty
pub fn decide(role: &Role, document: &Document) -> FilterReason {
    if !role.can_see_level(document.security_level) {
        return FilterReason::SecurityLevel;
    }
    if document.tags.iter().any(|tag| role.denied_tags.contains(tag)) {
        return FilterReason::DeniedTag;
    }
    if !role.allowed_tags.is_empty()
        && !document.tags.iter().any(|tag| role.allowed_tags.contains(tag))
    {
        return FilterReason::NotAllowlisted;
    }
    if !role.allowed_sources.is_empty() && !role.allowed_sources.contains(&document.source_type) {
        return FilterReason::SourceNotAllowed;
    }
    FilterReason::Included
}

/// Result of filtering one candidate list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// One decision per candidate, in input order.
    pub decisions: Vec<FilterDecision>,
    /// Included documents, in input order.
    pub included: Vec<Document>,
}

impl FilterOutcome {
    pub fn excluded_count(&self) -> usize {
        self.decisions.len() - self.included.len()
    }

    /// Counts exclusions per reason code.
    pub fn exclusions_by_reason(&self) -> BTreeMap<FilterReason, usize> {
        let mut counts = BTreeMap::new();
        for decision in self.decisions.iter().filter(|d| !d.included) {
            *counts.entry(decision.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Document filter engine.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    /// Whether to log exclusions.
    logging_enabled: bool,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self {
            logging_enabled: true,
        }
    }

    /// Disables per-document logging (for testing and bulk replays).
    pub fn without_logging(mut self) -> Self {
        self.logging_enabled = false;
        self
    }

    /// Filters `documents` for a resolved role.
    ///
    /// **Audit:** Logs every excluded document with its reason code.
    pub fn apply(&self, role: &ResolvedRole, documents: &[Document]) -> FilterOutcome {
        let mut outcome = FilterOutcome {
            decisions: Vec::with_capacity(documents.len()),
            included: Vec::new(),
        };

        for document in documents {
            let reason = decide(role.role(), document);
            if reason.is_inclusion() {
                outcome.included.push(document.clone());
            } else if self.logging_enabled {
                warn!(
                    role = %role.id(),
                    document = %document.id,
                    reason = ?reason,
                    "Document excluded by role policy"
                );
            }
            outcome
                .decisions
                .push(FilterDecision::new(document.id.clone(), reason));
        }

        if self.logging_enabled {
            info!(
                role = %role.id(),
                candidates = documents.len(),
                included = outcome.included.len(),
                "Documents filtered"
            );
        }

        debug_assert_eq!(outcome.decisions.len(), documents.len());
        outcome
    }

    /// Resolves `role_id` in `snapshot` for filtering.
    ///
    /// Any resolution problem other than a disabled role is reported as
    /// `UnknownRole`, so callers fail closed either way.
    pub fn resolve(&self, snapshot: &RegistrySnapshot, role_id: &RoleId) -> Result<ResolvedRole> {
        snapshot.resolve_role(role_id).map_err(|err| match err {
            RegistryError::RoleDisabled(id) => FilterError::RoleDisabled(id),
            _ => FilterError::UnknownRole(role_id.clone()),
        })
    }

    /// Resolves `role_id` in `snapshot`, then filters.
    ///
    /// Fails only with `UnknownRole` or `RoleDisabled`, producing no
    /// decisions and no documents.
    pub fn apply_for(
        &self,
        snapshot: &RegistrySnapshot,
        role_id: &RoleId,
        documents: &[Document],
    ) -> Result<FilterOutcome> {
        let role = self.resolve(snapshot, role_id)?;
        Ok(self.apply(&role, documents))
    }
}
