//! Policy evaluator: sequences filtering, rendering and audit per query.
//!
//! ```text
//! RECEIVED ─▶ FILTERING ─▶ RENDERING ─▶ LOGGED ─▶ DONE
//!                 │             │          ▲  └──▶ FAILED
//!                 └─────────────┴──────────┘
//!            unknown/disabled role, unknown template, strict render error
//! ```
//!
//! Every path reaches `LOGGED`: exactly one audit record is produced per
//! evaluation, whatever the outcome. Failures are fail-closed: the caller
//! gets no documents and the configured denial message.

use std::sync::Arc;
use std::time::Instant;

use rolegate_audit::{
    AuditDispatcher, AuditRecord, AuditSink, ChangeKind, ChangeResult, EvaluationEntry, Outcome,
    PolicyChangeEntry,
};
use rolegate_config::{EvaluatorConfig, RolegateConfig};
use rolegate_rbac::{
    DocumentFilter, PermissionSet, PermissionSetDefinition, RegistrySnapshot, Role,
    RoleDefinition, RoleRegistry,
};
use rolegate_template::{Context, StoreSnapshot, Template, TemplateDefinition, TemplateStore, Value};
use rolegate_types::{
    CallerId, Document, FailureKind, FilterDecision, RenderWarning, RoleId, TemplateId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::build_context;
use crate::error::{AdminError, Result};
use crate::retriever::Retriever;

// ============================================================================
// Request / Result
// ============================================================================

/// Stages an evaluation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationState {
    Received,
    Filtering,
    Rendering,
    Logged,
    Done,
    Failed,
}

impl EvaluationState {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationState::Received => "RECEIVED",
            EvaluationState::Filtering => "FILTERING",
            EvaluationState::Rendering => "RENDERING",
            EvaluationState::Logged => "LOGGED",
            EvaluationState::Done => "DONE",
            EvaluationState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EvaluationState::Done | EvaluationState::Failed)
    }
}

impl std::fmt::Display for EvaluationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One query to evaluate.
///
/// Identity is resolved upstream: the caller passes who is asking and under
/// which role.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub caller_id: CallerId,
    pub role_id: RoleId,
    pub query: String,
    /// Template intent; the configured default when absent.
    pub intent: Option<String>,
    /// Retriever candidates, in ranking order.
    pub documents: Vec<Document>,
    /// Caller-supplied template variables. System keys override these.
    pub variables: Context,
    /// Per-request strict rendering override.
    pub strict: Option<bool>,
}

impl EvaluationRequest {
    pub fn new(
        caller_id: impl Into<CallerId>,
        role_id: impl Into<RoleId>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            role_id: role_id.into(),
            query: query.into(),
            intent: None,
            documents: Vec::new(),
            variables: Context::new(),
            strict: None,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name, value);
        self
    }

    pub fn with_variables(mut self, variables: Context) -> Self {
        self.variables = variables;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }
}

/// What the caller is told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Rendered(String),
    /// Generic message; the specific rule is only in the audit trail.
    Denied(String),
}

impl Response {
    pub fn text(&self) -> &str {
        match self {
            Response::Rendered(text) | Response::Denied(text) => text,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Response::Denied(_))
    }
}

/// Caller-facing result of an evaluation.
///
/// Carries no per-document reason codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub filtered_documents: Vec<Document>,
    pub response: Response,
    pub failure: Option<FailureKind>,
    pub warnings_count: usize,
    pub audit_record_id: Uuid,
    /// False when at least one sink still has the record queued.
    pub audit_delivered: bool,
    pub state_trace: Vec<EvaluationState>,
}

impl EvaluationResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn final_state(&self) -> Option<EvaluationState> {
        self.state_trace.last().copied()
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Everything gathered while an evaluation runs, before it is logged.
struct Draft {
    started: Instant,
    trace: Vec<EvaluationState>,
    intent: String,
    decisions: Vec<FilterDecision>,
    included: Vec<Document>,
    template_id: Option<TemplateId>,
    warnings: Vec<RenderWarning>,
}

impl Draft {
    fn enter(&mut self, state: EvaluationState, role: &RoleId) {
        if let Some(from) = self.trace.last() {
            debug!(role = %role, from = %from, to = %state, "Evaluation state transition");
        }
        self.trace.push(state);
    }
}

/// The policy engine's entry point.
///
/// `Send + Sync`: share it through an `Arc` and evaluate from any number of
/// threads. Each evaluation reads one registry snapshot and one template
/// snapshot, so concurrent administrative writes never produce a torn view.
///
/// Administrative writes go through the evaluator rather than the registry
/// or store directly, so every attempt (applied or rejected) is audited.
#[derive(Debug)]
pub struct PolicyEvaluator {
    registry: RoleRegistry,
    templates: TemplateStore,
    filter: DocumentFilter,
    audit: AuditDispatcher,
    settings: EvaluatorConfig,
}

impl PolicyEvaluator {
    /// Creates an evaluator with default settings, auditing through `audit`.
    pub fn new(audit: AuditDispatcher) -> Self {
        Self {
            registry: RoleRegistry::new(),
            templates: TemplateStore::default(),
            filter: DocumentFilter::new(),
            audit,
            settings: EvaluatorConfig::default(),
        }
    }

    /// Creates an evaluator from loaded configuration.
    pub fn from_config(
        config: &RolegateConfig,
        sinks: impl IntoIterator<Item = Arc<dyn AuditSink>>,
    ) -> Self {
        let audit = sinks.into_iter().fold(
            AuditDispatcher::new(config.audit.max_delivery_attempts),
            AuditDispatcher::with_sink,
        );
        Self {
            templates: TemplateStore::new(config.templates.default_iteration_cap),
            settings: config.evaluator.clone(),
            ..Self::new(audit)
        }
    }

    /// Attaches another audit sink. Only records delivered afterwards reach it.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = self.audit.with_sink(sink);
        self
    }

    pub fn with_settings(mut self, settings: EvaluatorConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EvaluatorConfig {
        &self.settings
    }

    pub fn audit(&self) -> &AuditDispatcher {
        &self.audit
    }

    pub fn registry_snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn template_snapshot(&self) -> StoreSnapshot {
        self.templates.snapshot()
    }

    /// Evaluates one query.
    ///
    /// Never fails: every failure is reported in the result and the audit
    /// record.
    pub fn evaluate(&self, request: EvaluationRequest) -> EvaluationResult {
        let mut draft = Draft {
            started: Instant::now(),
            trace: vec![EvaluationState::Received],
            intent: request
                .intent
                .clone()
                .unwrap_or_else(|| self.settings.default_intent.clone()),
            decisions: Vec::new(),
            included: Vec::new(),
            template_id: None,
            warnings: Vec::new(),
        };
        let strict = request.strict.unwrap_or(self.settings.strict_rendering);

        let registry = self.registry.snapshot();
        let templates = self.templates.snapshot();

        draft.enter(EvaluationState::Filtering, &request.role_id);
        let role = match self.filter.resolve(&registry, &request.role_id) {
            Ok(role) => role,
            Err(err) => {
                return self.finish(&request, draft, Err((err.failure_kind(), err.to_string())));
            }
        };
        let outcome = self.filter.apply(&role, &request.documents);
        draft.decisions = outcome.decisions;
        draft.included = outcome.included;

        draft.enter(EvaluationState::Rendering, &request.role_id);
        let template = match templates.select(&draft.intent, role.id()) {
            Ok(template) => template,
            Err(err) => {
                return self.finish(&request, draft, Err((err.failure_kind(), err.to_string())));
            }
        };
        draft.template_id = Some(template.id.clone());

        let context = build_context(
            &role,
            &request.query,
            &draft.intent,
            &draft.included,
            &request.variables,
        );
        let rendered = match template.render(&context, strict) {
            Ok(rendered) => rendered,
            Err(err) => {
                return self.finish(&request, draft, Err((err.failure_kind(), err.to_string())));
            }
        };

        for warning in &rendered.warnings {
            warn!(
                role = %request.role_id,
                template = %template.id,
                code = %warning.code,
                variable = %warning.variable,
                "Render warning"
            );
        }
        draft.warnings = rendered.warnings;
        self.finish(&request, draft, Ok(rendered.text))
    }

    /// Asks `retriever` for candidates, then evaluates them.
    ///
    /// Any documents already on the request are replaced. The retriever is
    /// the ranking authority; the filter only removes.
    pub fn retrieve_and_evaluate(
        &self,
        retriever: &dyn Retriever,
        mut request: EvaluationRequest,
    ) -> EvaluationResult {
        request.documents = retriever.retrieve(&request.query, &request.role_id);
        debug!(
            role = %request.role_id,
            candidates = request.documents.len(),
            "Retrieved candidates"
        );
        self.evaluate(request)
    }

    /// Logs the evaluation and builds the caller-facing result.
    fn finish(
        &self,
        request: &EvaluationRequest,
        mut draft: Draft,
        result: std::result::Result<String, (FailureKind, String)>,
    ) -> EvaluationResult {
        let outcome = match &result {
            Ok(text) => Outcome::rendered(text),
            Err((failure, detail)) => Outcome::Failed {
                failure: *failure,
                detail: detail.clone(),
            },
        };

        let record = AuditRecord::evaluation(
            request.caller_id.clone(),
            EvaluationEntry {
                role_id: request.role_id.clone(),
                query: request.query.clone(),
                intent: draft.intent.clone(),
                template_id: draft.template_id.clone(),
                decisions: std::mem::take(&mut draft.decisions),
                outcome,
                warnings: draft.warnings.clone(),
                processing_time_ms: u64::try_from(draft.started.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
            },
        );
        let report = self.audit.deliver(&record);
        draft.enter(EvaluationState::Logged, &request.role_id);

        let (filtered_documents, response, failure) = match result {
            Ok(text) => {
                info!(
                    role = %request.role_id,
                    caller = %request.caller_id,
                    intent = %draft.intent,
                    included = draft.included.len(),
                    warnings = draft.warnings.len(),
                    "Evaluation granted"
                );
                draft.enter(EvaluationState::Done, &request.role_id);
                (std::mem::take(&mut draft.included), Response::Rendered(text), None)
            }
            Err((failure, detail)) => {
                warn!(
                    role = %request.role_id,
                    caller = %request.caller_id,
                    intent = %draft.intent,
                    failure = %failure,
                    detail = %detail,
                    "Evaluation denied"
                );
                draft.enter(EvaluationState::Failed, &request.role_id);
                (
                    Vec::new(),
                    Response::Denied(self.settings.denial_message.clone()),
                    Some(failure),
                )
            }
        };

        EvaluationResult {
            filtered_documents,
            response,
            failure,
            warnings_count: draft.warnings.len(),
            audit_record_id: record.id,
            audit_delivered: report.is_complete(),
            state_trace: draft.trace,
        }
    }

    // ========================================================================
    // Administrative operations
    // ========================================================================

    /// Creates a role.
    ///
    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn create_role(&self, actor: &CallerId, definition: RoleDefinition) -> Result<Arc<Role>> {
        let target = definition.id.clone();
        let result = self.registry.create_role(definition);
        self.audited(actor, ChangeKind::CreateRole, target, result, |r| r.version)
    }

    /// Replaces a role's rules, keeping its enabled flag.
    ///
    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn update_role(&self, actor: &CallerId, definition: RoleDefinition) -> Result<Arc<Role>> {
        let target = definition.id.clone();
        let result = self.registry.update_role(definition);
        self.audited(actor, ChangeKind::UpdateRole, target, result, |r| r.version)
    }

    /// Soft-disables a role; evaluations under it fail with `RoleDisabled`.
    ///
    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn disable_role(&self, actor: &CallerId, id: &RoleId) -> Result<Arc<Role>> {
        let result = self.registry.disable_role(id);
        self.audited(actor, ChangeKind::DisableRole, id.to_string(), result, |r| r.version)
    }

    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn enable_role(&self, actor: &CallerId, id: &RoleId) -> Result<Arc<Role>> {
        let result = self.registry.enable_role(id);
        self.audited(actor, ChangeKind::EnableRole, id.to_string(), result, |r| r.version)
    }

    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn create_permission_set(
        &self,
        actor: &CallerId,
        definition: PermissionSetDefinition,
    ) -> Result<Arc<PermissionSet>> {
        let target = definition.id.clone();
        let result = self.registry.create_permission_set(definition);
        self.audited(actor, ChangeKind::CreatePermissionSet, target, result, |s| s.version)
    }

    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn update_permission_set(
        &self,
        actor: &CallerId,
        definition: PermissionSetDefinition,
    ) -> Result<Arc<PermissionSet>> {
        let target = definition.id.clone();
        let result = self.registry.update_permission_set(definition);
        self.audited(actor, ChangeKind::UpdatePermissionSet, target, result, |s| s.version)
    }

    /// Parses, type-checks and stores a template.
    ///
    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn create_template(
        &self,
        actor: &CallerId,
        definition: TemplateDefinition,
    ) -> Result<Arc<Template>> {
        let target = definition.id.clone();
        let result = self.templates.create_template(definition);
        self.audited(actor, ChangeKind::CreateTemplate, target, result, |t| t.version)
    }

    /// **Audit:** one `policy_change` record, applied or rejected.
    pub fn update_template(
        &self,
        actor: &CallerId,
        definition: TemplateDefinition,
    ) -> Result<Arc<Template>> {
        let target = definition.id.clone();
        let result = self.templates.update_template(definition);
        self.audited(actor, ChangeKind::UpdateTemplate, target, result, |t| t.version)
    }

    /// Records the outcome of an administrative write and passes it through.
    fn audited<T, E>(
        &self,
        actor: &CallerId,
        change: ChangeKind,
        target: String,
        result: std::result::Result<T, E>,
        version: impl FnOnce(&T) -> u64,
    ) -> Result<T>
    where
        E: Into<AdminError>,
    {
        let result = result.map_err(Into::into);
        let change_result = match &result {
            Ok(value) => {
                let version = version(value);
                info!(
                    actor = %actor,
                    change = change.as_str(),
                    target = %target,
                    version,
                    "Policy change applied"
                );
                ChangeResult::Applied { version }
            }
            Err(err) => {
                warn!(
                    actor = %actor,
                    change = change.as_str(),
                    target = %target,
                    error = %err,
                    "Policy change rejected"
                );
                ChangeResult::Rejected {
                    failure: err.failure_kind(),
                    reason: err.to_string(),
                }
            }
        };

        let record = AuditRecord::policy_change(
            actor.clone(),
            PolicyChangeEntry {
                change,
                target,
                result: change_result,
            },
        );
        let report = self.audit.deliver(&record);
        if !report.is_complete() {
            warn!(
                actor = %actor,
                change = change.as_str(),
                record = %record.id,
                delivered = report.delivered,
                failed = report.failed,
                "Policy change audit record not fully delivered"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_audit::{AuditQuery, EntryType, MemorySink, SinkError};
    use rolegate_types::{FilterReason, SecurityLevel, WarningCode};
    use test_case::test_case;

    fn admin() -> CallerId {
        CallerId::new("admin")
    }

    fn evaluator() -> (PolicyEvaluator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let evaluator = PolicyEvaluator::new(AuditDispatcher::new(3).with_sink(sink.clone()));

        evaluator
            .create_role(
                &admin(),
                RoleDefinition::new("software-engineer", "Software Engineer")
                    .with_max_level("internal")
                    .deny_tag("admin-only"),
            )
            .unwrap();
        evaluator
            .create_template(
                &admin(),
                TemplateDefinition::new(
                    "answer-default",
                    "answer",
                    "{{document_count}} document(s) for {{role_name}}",
                ),
            )
            .unwrap();
        (evaluator, sink)
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("1", "confluence", SecurityLevel::Internal).with_tags(["admin-only"]),
            Document::new("2", "confluence", SecurityLevel::Internal).with_tags(["howto"]),
        ]
    }

    fn evaluations(sink: &MemorySink) -> Vec<AuditRecord> {
        sink.read(|log| {
            log.query(&AuditQuery::default().with_entry_type(EntryType::Evaluation))
                .into_iter()
                .cloned()
                .collect()
        })
    }

    #[test]
    fn granted_evaluation_walks_every_state() {
        let (evaluator, sink) = evaluator();
        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", "software-engineer", "how do I deploy?")
                .with_documents(docs()),
        );

        assert!(result.is_success());
        assert_eq!(
            result.state_trace,
            vec![
                EvaluationState::Received,
                EvaluationState::Filtering,
                EvaluationState::Rendering,
                EvaluationState::Logged,
                EvaluationState::Done,
            ]
        );
        assert_eq!(
            result
                .state_trace
                .iter()
                .filter(|s| s.is_terminal())
                .count(),
            1
        );
        assert_eq!(result.filtered_documents.len(), 1);
        assert_eq!(
            result.response,
            Response::Rendered("1 document(s) for Software Engineer".into())
        );
        assert!(result.audit_delivered);

        let records = evaluations(&sink);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, result.audit_record_id);
        let entry = records[0].as_evaluation().unwrap();
        assert_eq!(entry.excluded_count(FilterReason::DeniedTag), 1);
        assert_eq!(entry.template_id, Some(TemplateId::new("answer-default")));
        assert_eq!(
            entry.outcome,
            Outcome::rendered("1 document(s) for Software Engineer")
        );
    }

    #[test]
    fn unknown_role_skips_rendering() {
        let (evaluator, sink) = evaluator();
        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", "ghost-role", "q").with_documents(docs()),
        );

        assert_eq!(result.failure, Some(FailureKind::UnknownRole));
        assert!(result.filtered_documents.is_empty());
        assert_eq!(
            result.response,
            Response::Denied(rolegate_config::DEFAULT_DENIAL_MESSAGE.into())
        );
        assert_eq!(
            result.state_trace,
            vec![
                EvaluationState::Received,
                EvaluationState::Filtering,
                EvaluationState::Logged,
                EvaluationState::Failed,
            ]
        );
        let records = evaluations(&sink);
        assert_eq!(records.len(), 1);
        assert!(records[0].as_evaluation().unwrap().decisions.is_empty());
    }

    #[test]
    fn disabled_role_fails_closed() {
        let (evaluator, _sink) = evaluator();
        evaluator
            .disable_role(&admin(), &RoleId::new("software-engineer"))
            .unwrap();

        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", "software-engineer", "q").with_documents(docs()),
        );
        assert_eq!(result.failure, Some(FailureKind::RoleDisabled));
        assert!(result.filtered_documents.is_empty());

        evaluator
            .enable_role(&admin(), &RoleId::new("software-engineer"))
            .unwrap();
        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", "software-engineer", "q").with_documents(docs()),
        );
        assert!(result.is_success());
    }

    #[test]
    fn unknown_template_keeps_decisions_in_audit() {
        let (evaluator, sink) = evaluator();
        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", "software-engineer", "q")
                .with_intent("escalation")
                .with_documents(docs()),
        );

        assert_eq!(result.failure, Some(FailureKind::UnknownTemplate));
        assert!(result.filtered_documents.is_empty());
        assert_eq!(result.final_state(), Some(EvaluationState::Failed));

        let records = evaluations(&sink);
        let entry = records[0].as_evaluation().unwrap();
        assert_eq!(entry.decisions.len(), 2);
        assert_eq!(entry.intent, "escalation");
        assert!(entry.template_id.is_none());
    }

    #[test_case(false, None ; "lenient renders with a warning")]
    #[test_case(true, Some(FailureKind::UnresolvedVariable) ; "strict fails")]
    fn unresolved_variable(strict: bool, expected: Option<FailureKind>) {
        let (evaluator, _sink) = evaluator();
        evaluator
            .create_template(
                &admin(),
                TemplateDefinition::new("runbook", "runbook", "Run {{command}}"),
            )
            .unwrap();

        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", "software-engineer", "q")
                .with_intent("runbook")
                .strict(strict),
        );

        assert_eq!(result.failure, expected);
        if strict {
            assert!(result.response.is_denied());
        } else {
            assert_eq!(result.response, Response::Rendered("Run ".into()));
            assert_eq!(result.warnings_count, 1);
        }
    }

    #[test]
    fn strict_default_comes_from_settings() {
        let (evaluator, _sink) = evaluator();
        let evaluator = evaluator.with_settings(EvaluatorConfig {
            strict_rendering: true,
            denial_message: "Nope.".into(),
            ..EvaluatorConfig::default()
        });
        evaluator
            .create_template(&admin(), TemplateDefinition::new("r", "runbook", "{{command}}"))
            .unwrap();

        let result = evaluator
            .evaluate(EvaluationRequest::new("alice", "software-engineer", "q").with_intent("runbook"));
        assert_eq!(result.failure, Some(FailureKind::UnresolvedVariable));
        assert_eq!(result.response, Response::Denied("Nope.".into()));
    }

    #[test]
    fn cap_warning_is_recorded() {
        let (evaluator, sink) = evaluator();
        evaluator
            .create_template(
                &admin(),
                TemplateDefinition::new(
                    "ids",
                    "ids",
                    "{% for id in document_ids cap 1 %}[{{id}}]{% endfor %}",
                ),
            )
            .unwrap();
        evaluator
            .update_role(
                &admin(),
                RoleDefinition::new("software-engineer", "Software Engineer")
                    .with_max_level("internal"),
            )
            .unwrap();

        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", "software-engineer", "q")
                .with_intent("ids")
                .with_documents(docs()),
        );
        assert_eq!(result.response, Response::Rendered("[1]".into()));
        assert_eq!(result.warnings_count, 1);

        let records = evaluations(&sink);
        let warnings = &records[0].as_evaluation().unwrap().warnings;
        assert_eq!(warnings[0].code, WarningCode::IterationCapExceeded);
    }

    #[test]
    fn admin_operations_are_audited_applied_or_rejected() {
        let (evaluator, sink) = evaluator();
        let before = sink.count();

        let err = evaluator
            .create_role(
                &admin(),
                RoleDefinition::new("software-engineer", "Duplicate"),
            )
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::MalformedRule);

        let err = evaluator
            .create_template(
                &admin(),
                TemplateDefinition::new("broken", "answer", "{% if %}"),
            )
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::MalformedTemplate);

        evaluator
            .create_permission_set(
                &admin(),
                PermissionSetDefinition::new("operators", "Operators").grant("restart-pods"),
            )
            .unwrap();

        assert_eq!(sink.count(), before + 3);
        let rejected: Vec<ChangeKind> = sink.read(|log| {
            log.query(&AuditQuery::default().with_entry_type(EntryType::PolicyChange))
                .into_iter()
                .filter(|r| r.is_failure())
                .filter_map(|r| r.as_policy_change().map(|c| c.change))
                .collect()
        });
        assert_eq!(rejected, [ChangeKind::CreateRole, ChangeKind::CreateTemplate]);
    }

    #[test]
    fn snapshot_accessors_reflect_admin_writes() {
        let (evaluator, _sink) = evaluator();
        assert!(evaluator
            .registry_snapshot()
            .role(&RoleId::new("software-engineer"))
            .is_some());
        assert!(evaluator
            .template_snapshot()
            .get(&TemplateId::new("answer-default"))
            .is_some());
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = RolegateConfig::default();
        config.evaluator.default_intent = "summary".into();
        config.audit.max_delivery_attempts = 7;
        let sink: Arc<dyn AuditSink> = Arc::new(MemorySink::new());

        let evaluator = PolicyEvaluator::from_config(&config, [sink]);
        assert_eq!(evaluator.settings().default_intent, "summary");
        assert_eq!(evaluator.audit().max_attempts(), 7);
        assert_eq!(evaluator.audit().sink_count(), 1);
    }

    #[test]
    fn evaluation_without_sinks_is_not_reported_delivered() {
        let evaluator = PolicyEvaluator::new(AuditDispatcher::new(3));
        let result = evaluator.evaluate(EvaluationRequest::new("u", "nobody", "q"));

        assert!(!result.audit_delivered);
        assert!(result.state_trace.contains(&EvaluationState::Logged));
    }

    struct DownSink;

    impl AuditSink for DownSink {
        fn name(&self) -> &str {
            "down"
        }

        fn persist(&self, _record: &AuditRecord) -> std::result::Result<(), SinkError> {
            Err(SinkError::Unavailable("disk full".into()))
        }
    }

    #[test]
    fn admin_write_applies_even_when_audit_delivery_fails() {
        let evaluator = PolicyEvaluator::new(AuditDispatcher::new(2).with_sink(Arc::new(DownSink)));

        let role = evaluator
            .create_role(&admin(), RoleDefinition::new("qa-engineer", "QA Engineer"))
            .unwrap();
        assert_eq!(role.version, 1);

        let queued = evaluator.audit().undelivered();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].sink, "down");
        assert_eq!(
            queued[0].record.as_policy_change().map(|c| c.change),
            Some(ChangeKind::CreateRole)
        );
    }

    #[test]
    fn evaluator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PolicyEvaluator>();
    }
}
