//! Append-only in-memory audit log with query and export.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rolegate_types::{CallerId, FilterReason, RoleId};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AuditError, Result};
use crate::record::{AuditEntry, AuditRecord, ChangeResult, EntryType, Outcome};

/// Query filter for the audit log.
///
/// All fields are optional and combined with AND logic.
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub role_id: Option<RoleId>,
    pub caller_id: Option<CallerId>,
    pub entry_type: Option<EntryType>,
    pub failures_only: bool,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// Filter by evaluating role.
    pub fn with_role(mut self, role_id: impl Into<RoleId>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    pub fn with_caller(mut self, caller_id: impl Into<CallerId>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    pub fn with_entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    /// Only failed evaluations and rejected changes.
    pub fn failures_only(mut self) -> Self {
        self.failures_only = true;
        self
    }

    /// Filter to records within a time range (inclusive).
    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.time_from = Some(from);
        self.time_to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(role) = &self.role_id
            && record.role_id().as_ref() != Some(role)
        {
            return false;
        }
        if let Some(caller) = &self.caller_id
            && record.caller_id != *caller
        {
            return false;
        }
        if let Some(entry_type) = self.entry_type
            && record.entry_type() != entry_type
        {
            return false;
        }
        if self.failures_only && !record.is_failure() {
            return false;
        }
        if self.time_from.is_some_and(|from| record.timestamp < from) {
            return false;
        }
        if self.time_to.is_some_and(|to| record.timestamp > to) {
            return false;
        }
        true
    }
}

/// Per-role totals over evaluation records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSummary {
    pub evaluations: usize,
    pub failures: usize,
    pub documents_included: usize,
    /// Excluded documents per reason code.
    pub documents_excluded: BTreeMap<FilterReason, usize>,
    pub total_processing_ms: u64,
}

impl RoleSummary {
    pub fn excluded_total(&self) -> usize {
        self.documents_excluded.values().sum()
    }

    /// Mean processing time in milliseconds, or 0 with no evaluations.
    pub fn average_processing_ms(&self) -> u64 {
        match u64::try_from(self.evaluations) {
            Ok(0) | Err(_) => 0,
            Ok(n) => self.total_processing_ms / n,
        }
    }
}

/// Immutable, append-only audit log.
///
/// The API provides no mutation or deletion of appended records. Appends
/// are idempotent on record id.
#[derive(Debug, Default, Clone)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
    ids: HashSet<Uuid>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Returns `false` if a record with the same id is
    /// already present, in which case the log is unchanged.
    ///
    /// # Assertions
    ///
    /// - Post: record count increases by exactly 1 on a new id
    pub fn append(&mut self, record: AuditRecord) -> bool {
        if !self.ids.insert(record.id) {
            return false;
        }

        let count_before = self.records.len();
        self.records.push(record);

        // Post-condition: exactly one record was added
        assert_eq!(
            self.records.len(),
            count_before + 1,
            "Audit log append must increase record count by exactly 1"
        );
        true
    }

    /// Records matching `filter`, in insertion order.
    pub fn query(&self, filter: &AuditQuery) -> Vec<&AuditRecord> {
        let mut results: Vec<&AuditRecord> = self
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .collect();

        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        results
    }

    pub fn get(&self, id: Uuid) -> Option<&AuditRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Exports filtered records as a pretty-printed JSON array.
    pub fn export_json(&self, filter: &AuditQuery) -> Result<String> {
        let records = self.query(filter);
        serde_json::to_string_pretty(&records).map_err(AuditError::from)
    }

    /// Exports filtered records as CSV with a header row.
    ///
    /// Columns: `id,timestamp,caller_id,type,role_id,change,target,query,intent,included,excluded,outcome,detail,processing_ms`
    pub fn export_csv(&self, filter: &AuditQuery) -> String {
        let mut output = String::from(
            "id,timestamp,caller_id,type,role_id,change,target,query,intent,included,excluded,outcome,detail,processing_ms\n",
        );

        for record in self.query(filter) {
            let row = match &record.entry {
                AuditEntry::Evaluation(entry) => {
                    let (outcome, detail) = match &entry.outcome {
                        Outcome::Rendered { response_hash } => ("rendered", response_hash.clone()),
                        Outcome::Failed { failure, detail } => {
                            (failure.as_str(), detail.clone())
                        }
                    };
                    [
                        entry.role_id.to_string(),
                        String::new(),
                        String::new(),
                        entry.query.clone(),
                        entry.intent.clone(),
                        entry.included_count().to_string(),
                        (entry.decisions.len() - entry.included_count()).to_string(),
                        outcome.to_string(),
                        detail,
                        entry.processing_time_ms.to_string(),
                    ]
                }
                AuditEntry::PolicyChange(entry) => {
                    let (outcome, detail) = match &entry.result {
                        ChangeResult::Applied { version } => ("applied", format!("version {version}")),
                        ChangeResult::Rejected { failure, reason } => {
                            (failure.as_str(), reason.clone())
                        }
                    };
                    [
                        record.role_id().map(|r| r.to_string()).unwrap_or_default(),
                        entry.change.as_str().to_string(),
                        entry.target.clone(),
                        String::new(),
                        String::new(),
                        String::new(),
                        String::new(),
                        outcome.to_string(),
                        detail,
                        String::new(),
                    ]
                }
            };

            output.push_str(&format!(
                "{},{},{},{}",
                record.id,
                record.timestamp.to_rfc3339(),
                csv_escape(record.caller_id.as_str()),
                record.entry_type().as_str(),
            ));
            for field in &row {
                output.push(',');
                output.push_str(&csv_escape(field));
            }
            output.push('\n');
        }

        output
    }

    /// Per-role totals across all evaluation records.
    pub fn role_summary(&self) -> BTreeMap<RoleId, RoleSummary> {
        let mut summaries: BTreeMap<RoleId, RoleSummary> = BTreeMap::new();

        for entry in self.records.iter().filter_map(AuditRecord::as_evaluation) {
            let summary = summaries.entry(entry.role_id.clone()).or_default();
            summary.evaluations += 1;
            summary.total_processing_ms += entry.processing_time_ms;
            if matches!(entry.outcome, Outcome::Failed { .. }) {
                summary.failures += 1;
            }
            for decision in &entry.decisions {
                if decision.included {
                    summary.documents_included += 1;
                } else {
                    *summary.documents_excluded.entry(decision.reason).or_insert(0) += 1;
                }
            }
        }

        summaries
    }
}

/// Escape a CSV field value
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        let escaped = field.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ChangeKind, EvaluationEntry, PolicyChangeEntry};
    use rolegate_types::{DocumentId, FailureKind, FilterDecision};
    use proptest::prelude::*;

    fn evaluation(caller: &str, role: &str, reasons: &[FilterReason], outcome: Outcome) -> AuditRecord {
        AuditRecord::evaluation(
            CallerId::new(caller),
            EvaluationEntry {
                role_id: RoleId::new(role),
                query: "restart, then verify".into(),
                intent: "answer".into(),
                template_id: None,
                decisions: reasons
                    .iter()
                    .enumerate()
                    .map(|(i, r)| FilterDecision::new(DocumentId::new(i.to_string()), *r))
                    .collect(),
                outcome,
                warnings: Vec::new(),
                processing_time_ms: 10,
            },
        )
    }

    fn failed(kind: FailureKind) -> Outcome {
        Outcome::Failed {
            failure: kind,
            detail: kind.to_string(),
        }
    }

    fn populated() -> AuditLog {
        let mut log = AuditLog::new();
        log.append(evaluation(
            "alice",
            "software-engineer",
            &[FilterReason::DeniedTag, FilterReason::Included],
            Outcome::rendered("ok"),
        ));
        log.append(evaluation(
            "bob",
            "devops-engineer",
            &[FilterReason::Included, FilterReason::Included],
            Outcome::rendered("ok"),
        ));
        log.append(evaluation("mallory", "ghost-role", &[], failed(FailureKind::UnknownRole)));
        log.append(AuditRecord::policy_change(
            CallerId::new("admin"),
            PolicyChangeEntry {
                change: ChangeKind::DisableRole,
                target: "qa-engineer".into(),
                result: ChangeResult::Applied { version: 2 },
            },
        ));
        log
    }

    #[test]
    fn append_is_idempotent_on_id() {
        let mut log = AuditLog::new();
        let record = evaluation("alice", "qa", &[], Outcome::rendered("x"));
        assert!(log.append(record.clone()));
        assert!(!log.append(record.clone()));
        assert_eq!(log.count(), 1);
        assert_eq!(log.get(record.id), Some(&record));
    }

    #[test]
    fn query_filters_combine() {
        let log = populated();
        assert_eq!(log.query(&AuditQuery::default()).len(), 4);
        assert_eq!(log.query(&AuditQuery::default().with_role("devops-engineer")).len(), 1);
        // Role changes are found by the role they targeted.
        assert_eq!(log.query(&AuditQuery::default().with_role("qa-engineer")).len(), 1);
        assert_eq!(log.query(&AuditQuery::default().with_caller("mallory")).len(), 1);
        assert_eq!(log.query(&AuditQuery::default().failures_only()).len(), 1);
        assert_eq!(
            log.query(&AuditQuery::default().with_entry_type(EntryType::PolicyChange))
                .len(),
            1
        );
        assert_eq!(log.query(&AuditQuery::default().with_limit(2)).len(), 2);
        assert!(log
            .query(&AuditQuery::default().with_role("devops-engineer").failures_only())
            .is_empty());
    }

    #[test]
    fn query_by_time_range() {
        let log = populated();
        let first = log.records()[0].timestamp;
        let last = log.records()[3].timestamp;
        assert_eq!(log.query(&AuditQuery::default().with_time_range(first, last)).len(), 4);

        let before = first - chrono::Duration::seconds(10);
        assert!(log
            .query(&AuditQuery::default().with_time_range(before, before))
            .is_empty());
    }

    #[test]
    fn export_json_round_trips() {
        let log = populated();
        let json = log.export_json(&AuditQuery::default().failures_only()).unwrap();
        let parsed: Vec<AuditRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].failure(), Some(FailureKind::UnknownRole));
    }

    #[test]
    fn export_csv_escapes_fields() {
        let log = populated();
        let csv = log.export_csv(&AuditQuery::default());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("id,timestamp,caller_id,type"));
        assert!(lines[1].contains("\"restart, then verify\""));
        assert!(lines[3].contains("UnknownRole"));
        assert!(lines[4].contains("policy_change"));
        assert!(lines[4].contains("disable_role"));
        assert!(lines[4].contains(",qa-engineer,disable_role,qa-engineer,"));
    }

    #[test]
    fn role_summary_counts_per_reason() {
        let summary = populated().role_summary();

        let engineer = &summary[&RoleId::new("software-engineer")];
        assert_eq!(engineer.evaluations, 1);
        assert_eq!(engineer.documents_included, 1);
        assert_eq!(engineer.documents_excluded.get(&FilterReason::DeniedTag), Some(&1));
        assert_eq!(engineer.excluded_total(), 1);
        assert_eq!(engineer.average_processing_ms(), 10);

        let ghost = &summary[&RoleId::new("ghost-role")];
        assert_eq!(ghost.failures, 1);
        assert_eq!(summary.len(), 3);
    }

    #[test]
    fn csv_escape_quotes() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    proptest! {
        #[test]
        fn appends_keep_first_seen_order_without_duplicates(
            picks in prop::collection::vec(0usize..5, 0..30),
        ) {
            let pool: Vec<AuditRecord> = (0..5)
                .map(|_| evaluation("alice", "qa", &[], Outcome::rendered("ok")))
                .collect();
            let mut log = AuditLog::new();
            let mut expected = Vec::new();
            for i in picks {
                let fresh = !expected.contains(&pool[i].id);
                prop_assert_eq!(log.append(pool[i].clone()), fresh);
                if fresh {
                    expected.push(pool[i].id);
                }
            }

            let ids: Vec<Uuid> = log.records().iter().map(|r| r.id).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}

