//! # rolegate-types: Core types for `rolegate`
//!
//! This crate contains shared types used across the `rolegate` system:
//! - Entity IDs ([`RoleId`], [`PermissionSetId`], [`DocumentId`], [`TemplateId`], [`CallerId`])
//! - Document sensitivity ([`SecurityLevel`])
//! - Retrieved documents ([`Document`])
//! - Per-document filter verdicts ([`FilterDecision`], [`FilterReason`])
//! - Render warnings ([`RenderWarning`], [`WarningCode`])
//! - Evaluation failure kinds ([`FailureKind`])

use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Entity IDs - string-backed, Clone
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

string_id!(
    /// Unique identifier for a role (e.g. `software-engineer`).
    RoleId
);

string_id!(
    /// Unique identifier for a reusable permission set.
    PermissionSetId
);

string_id!(
    /// Identifier assigned to a document by the external retriever.
    DocumentId
);

string_id!(
    /// Unique identifier for a response template.
    TemplateId
);

string_id!(
    /// Identity of the caller (user or service) issuing a query.
    CallerId
);

// ============================================================================
// Security Level - Copy (ordered enum)
// ============================================================================

/// Sensitivity classification of a document.
///
/// Levels form a total order: `Public < Internal < Confidential < Restricted`.
/// A role can never see a document whose level exceeds its ceiling.
///
/// On the wire a level is an ordinal integer (0-3). Deserialization also
/// accepts the lower-case level name so policy files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "SecurityLevelRepr")]
pub enum SecurityLevel {
    /// Publicly shareable material.
    Public,
    /// Internal engineering documentation.
    Internal,
    /// Confidential operational material (runbooks, incident data).
    Confidential,
    /// Restricted material (credentials, security procedures).
    Restricted,
}

impl SecurityLevel {
    /// All levels in ascending order.
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Public,
        SecurityLevel::Internal,
        SecurityLevel::Confidential,
        SecurityLevel::Restricted,
    ];

    /// Returns the ordinal (0 = public, 3 = restricted).
    pub fn ordinal(self) -> u8 {
        match self {
            SecurityLevel::Public => 0,
            SecurityLevel::Internal => 1,
            SecurityLevel::Confidential => 2,
            SecurityLevel::Restricted => 3,
        }
    }

    /// Returns the level for an ordinal, if it is one of the four defined levels.
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    /// Returns the lower-case level name.
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityLevel::Public => "public",
            SecurityLevel::Internal => "internal",
            SecurityLevel::Confidential => "confidential",
            SecurityLevel::Restricted => "restricted",
        }
    }
}

impl Default for SecurityLevel {
    /// Defaults to the lowest level: a ceiling nobody configured grants the least.
    fn default() -> Self {
        Self::Public
    }
}

impl Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a security level name or ordinal is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid security level '{0}': expected public, internal, confidential, restricted or 0-3")]
pub struct ParseSecurityLevelError(pub String);

impl FromStr for SecurityLevel {
    type Err = ParseSecurityLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(ordinal) = normalized.parse::<u8>() {
            return Self::from_ordinal(ordinal).ok_or(ParseSecurityLevelError(s.to_string()));
        }
        match normalized.as_str() {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "confidential" => Ok(Self::Confidential),
            "restricted" => Ok(Self::Restricted),
            _ => Err(ParseSecurityLevelError(s.to_string())),
        }
    }
}

impl From<SecurityLevel> for u8 {
    fn from(level: SecurityLevel) -> Self {
        level.ordinal()
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = ParseSecurityLevelError;

    fn try_from(ordinal: u8) -> Result<Self, Self::Error> {
        Self::from_ordinal(ordinal).ok_or(ParseSecurityLevelError(ordinal.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SecurityLevelRepr {
    Ordinal(u8),
    Name(String),
}

impl TryFrom<SecurityLevelRepr> for SecurityLevel {
    type Error = ParseSecurityLevelError;

    fn try_from(repr: SecurityLevelRepr) -> Result<Self, Self::Error> {
        match repr {
            SecurityLevelRepr::Ordinal(ordinal) => Self::try_from(ordinal),
            SecurityLevelRepr::Name(name) => name.parse(),
        }
    }
}

// ============================================================================
// Document - Clone (produced by the external retriever)
// ============================================================================

/// A candidate knowledge-base document.
///
/// Produced by the external retriever and immutable within one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    /// Connector the document came from (e.g. `confluence`, `github`).
    pub source_type: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub owner_team: String,
}

impl Document {
    pub fn new(
        id: impl Into<DocumentId>,
        source_type: impl Into<String>,
        security_level: SecurityLevel,
    ) -> Self {
        Self {
            id: id.into(),
            source_type: source_type.into(),
            tags: BTreeSet::new(),
            security_level,
            owner_team: String::new(),
        }
    }

    /// Adds tags (builder pattern).
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the owning team.
    pub fn with_owner(mut self, team: impl Into<String>) -> Self {
        self.owner_team = team.into();
        self
    }
}

// ============================================================================
// Filter Decisions
// ============================================================================

/// Why a document was included or excluded.
///
/// Reason codes are only surfaced through the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterReason {
    /// Document level exceeds the role's ceiling.
    SecurityLevel,
    /// Document carries a tag the role denies.
    DeniedTag,
    /// Role has an allowlist and the document matches none of it.
    NotAllowlisted,
    /// Role restricts sources and the document's source is not listed.
    SourceNotAllowed,
    /// Every check passed.
    Included,
}

impl FilterReason {
    /// Exclusion reasons in evaluation precedence order.
    pub const EXCLUSIONS: [FilterReason; 4] = [
        FilterReason::SecurityLevel,
        FilterReason::DeniedTag,
        FilterReason::NotAllowlisted,
        FilterReason::SourceNotAllowed,
    ];

    /// Returns the wire reason code.
    pub fn code(self) -> &'static str {
        match self {
            FilterReason::SecurityLevel => "SECURITY_LEVEL",
            FilterReason::DeniedTag => "DENIED_TAG",
            FilterReason::NotAllowlisted => "NOT_ALLOWLISTED",
            FilterReason::SourceNotAllowed => "SOURCE_NOT_ALLOWED",
            FilterReason::Included => "INCLUDED",
        }
    }

    pub fn is_inclusion(self) -> bool {
        self == FilterReason::Included
    }
}

impl Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-document include/exclude verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDecision {
    pub document_id: DocumentId,
    pub included: bool,
    #[serde(rename = "reasonCode")]
    pub reason: FilterReason,
}

impl FilterDecision {
    pub fn new(document_id: DocumentId, reason: FilterReason) -> Self {
        Self {
            document_id,
            included: reason.is_inclusion(),
            reason,
        }
    }
}

// ============================================================================
// Render Warnings
// ============================================================================

/// Non-fatal rendering problem, recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// A variable was missing from the context and rendered empty (or false).
    UnresolvedVariable,
    /// A context value had the wrong type and rendered empty (or false).
    TypeMismatch,
    /// A loop stopped at its iteration cap.
    IterationCapExceeded,
}

impl WarningCode {
    pub fn code(self) -> &'static str {
        match self {
            WarningCode::UnresolvedVariable => "UNRESOLVED_VARIABLE",
            WarningCode::TypeMismatch => "TYPE_MISMATCH",
            WarningCode::IterationCapExceeded => "ITERATION_CAP_EXCEEDED",
        }
    }
}

impl Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A warning raised while rendering, naming the variable involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderWarning {
    pub code: WarningCode,
    pub variable: String,
}

impl RenderWarning {
    pub fn new(code: WarningCode, variable: impl Into<String>) -> Self {
        Self {
            code,
            variable: variable.into(),
        }
    }
}

// ============================================================================
// Failure Kinds
// ============================================================================

/// Fatal outcome of an evaluation or a rejected policy write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The role id does not resolve.
    UnknownRole,
    /// The role exists but has been soft-disabled.
    RoleDisabled,
    /// No template exists for the intent, neither role-specific nor global.
    UnknownTemplate,
    /// Template source failed to parse or type-check.
    MalformedTemplate,
    /// Strict rendering hit a variable missing from the context.
    UnresolvedVariable,
    /// Strict rendering hit a context value of the wrong type.
    TypeMismatch,
    /// A role or permission-set write failed validation.
    MalformedRule,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UnknownRole => "UnknownRole",
            FailureKind::RoleDisabled => "RoleDisabled",
            FailureKind::UnknownTemplate => "UnknownTemplate",
            FailureKind::MalformedTemplate => "MalformedTemplate",
            FailureKind::UnresolvedVariable => "UnresolvedVariable",
            FailureKind::TypeMismatch => "TypeMismatch",
            FailureKind::MalformedRule => "MalformedRule",
        }
    }

    /// Returns true for failures raised while filtering.
    ///
    /// Filtering failures are fail-closed: zero documents, no response.
    pub fn is_filtering_failure(self) -> bool {
        matches!(self, FailureKind::UnknownRole | FailureKind::RoleDisabled)
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
