//! Audit record types.
//!
//! Once created, a record is never modified. Every field is set at creation
//! time; the log and sinks only ever append.

use chrono::{DateTime, Utc};
use rolegate_types::{
    CallerId, FailureKind, FilterDecision, FilterReason, RenderWarning, RoleId, TemplateId,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Unique record identifier. Sinks deduplicate on it.
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Who issued the query or the administrative write.
    pub caller_id: CallerId,
    pub entry: AuditEntry,
}

impl AuditRecord {
    /// Creates a record stamped with a fresh id and the current time.
    pub fn new(caller_id: CallerId, entry: AuditEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            caller_id,
            entry,
        }
    }

    pub fn evaluation(caller_id: CallerId, entry: EvaluationEntry) -> Self {
        Self::new(caller_id, AuditEntry::Evaluation(entry))
    }

    pub fn policy_change(caller_id: CallerId, entry: PolicyChangeEntry) -> Self {
        Self::new(caller_id, AuditEntry::PolicyChange(entry))
    }

    pub fn entry_type(&self) -> EntryType {
        match self.entry {
            AuditEntry::Evaluation(_) => EntryType::Evaluation,
            AuditEntry::PolicyChange(_) => EntryType::PolicyChange,
        }
    }

    /// Role the record concerns: the evaluating role, or the role a change targeted.
    ///
    /// `None` for permission set and template changes.
    pub fn role_id(&self) -> Option<RoleId> {
        match &self.entry {
            AuditEntry::Evaluation(entry) => Some(entry.role_id.clone()),
            AuditEntry::PolicyChange(entry) if entry.change.is_role_change() => {
                Some(RoleId::new(entry.target.as_str()))
            }
            AuditEntry::PolicyChange(_) => None,
        }
    }

    /// Failure kind for failed evaluations and rejected changes.
    pub fn failure(&self) -> Option<FailureKind> {
        match &self.entry {
            AuditEntry::Evaluation(entry) => match &entry.outcome {
                Outcome::Rendered { .. } => None,
                Outcome::Failed { failure, .. } => Some(*failure),
            },
            AuditEntry::PolicyChange(entry) => match &entry.result {
                ChangeResult::Applied { .. } => None,
                ChangeResult::Rejected { failure, .. } => Some(*failure),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure().is_some()
    }

    pub fn as_evaluation(&self) -> Option<&EvaluationEntry> {
        match &self.entry {
            AuditEntry::Evaluation(entry) => Some(entry),
            AuditEntry::PolicyChange(_) => None,
        }
    }

    pub fn as_policy_change(&self) -> Option<&PolicyChangeEntry> {
        match &self.entry {
            AuditEntry::PolicyChange(entry) => Some(entry),
            AuditEntry::Evaluation(_) => None,
        }
    }
}

/// Discriminant of [`AuditEntry`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Evaluation,
    PolicyChange,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Evaluation => "evaluation",
            EntryType::PolicyChange => "policy_change",
        }
    }
}

/// What a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEntry {
    Evaluation(EvaluationEntry),
    PolicyChange(PolicyChangeEntry),
}

/// One query evaluation, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEntry {
    pub role_id: RoleId,
    pub query: String,
    pub intent: String,
    /// Template that rendered the response, when one was selected.
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    /// One decision per candidate document, in retriever order.
    pub decisions: Vec<FilterDecision>,
    pub outcome: Outcome,
    #[serde(default)]
    pub warnings: Vec<RenderWarning>,
    pub processing_time_ms: u64,
}

impl EvaluationEntry {
    pub fn included_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.included).count()
    }

    pub fn excluded_count(&self, reason: FilterReason) -> usize {
        self.decisions
            .iter()
            .filter(|d| !d.included && d.reason == reason)
            .count()
    }
}

/// How an evaluation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// A response was rendered; only its hash is kept.
    #[serde(rename_all = "camelCase")]
    Rendered { response_hash: String },

    /// The evaluation failed closed.
    Failed { failure: FailureKind, detail: String },
}

impl Outcome {
    /// Builds a `Rendered` outcome from the response text.
    pub fn rendered(response: &str) -> Self {
        Outcome::Rendered {
            response_hash: response_hash(response),
        }
    }
}

/// Administrative write kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    CreateRole,
    UpdateRole,
    DisableRole,
    EnableRole,
    CreatePermissionSet,
    UpdatePermissionSet,
    CreateTemplate,
    UpdateTemplate,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::CreateRole => "create_role",
            ChangeKind::UpdateRole => "update_role",
            ChangeKind::DisableRole => "disable_role",
            ChangeKind::EnableRole => "enable_role",
            ChangeKind::CreatePermissionSet => "create_permission_set",
            ChangeKind::UpdatePermissionSet => "update_permission_set",
            ChangeKind::CreateTemplate => "create_template",
            ChangeKind::UpdateTemplate => "update_template",
        }
    }

    /// Whether the change targets a role (its target is a role id).
    pub fn is_role_change(self) -> bool {
        matches!(
            self,
            ChangeKind::CreateRole
                | ChangeKind::UpdateRole
                | ChangeKind::DisableRole
                | ChangeKind::EnableRole
        )
    }
}

/// One administrative write attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChangeEntry {
    pub change: ChangeKind,
    /// Id of the role, permission set or template written.
    pub target: String,
    pub result: ChangeResult,
}

/// Whether a write was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeResult {
    Applied { version: u64 },
    Rejected { failure: FailureKind, reason: String },
}

/// Lower-case hex SHA-256 of a rendered response.
pub fn response_hash(response: &str) -> String {
    Sha256::digest(response.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
