//! End-to-end evaluation scenarios.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use rolegate::{
    EvaluationRequest, EvaluationState, PolicyEvaluator, PolicyFile, Response, StaticRetriever,
};
use rolegate_audit::{AuditDispatcher, AuditQuery, EntryType, MemorySink, Outcome, response_hash};
use rolegate_rbac::RoleDefinition;
use rolegate_types::{CallerId, Document, FailureKind, FilterReason, RoleId, SecurityLevel};

const POLICY: &str = r#"
[[permission_sets]]
id = "operators"
name = "Operators"
permissions = ["restart-pods", "edit-jobs", "view-logs"]

[[roles]]
id = "software-engineer"
name = "Software Engineer"
maxSecurityLevel = "internal"
deniedTags = ["admin-only"]
permissions = { canViewLogs = true }

[[roles]]
id = "devops-engineer"
name = "DevOps Engineer"
permissionSet = "operators"
maxSecurityLevel = "confidential"

[[templates]]
id = "answer-default"
intent = "answer"
body = "Found {{document_count}} document(s)."

[[templates]]
id = "restart"
intent = "restart"
body = "{% if requires_admin %}Contact DevOps for {{action}}{% else %}Run {{command}}{% endif %}"
variables = { requires_admin = "bool", action = "string", command = "string" }

[[templates]]
id = "restart-devops"
intent = "restart"
role = "devops-engineer"
body = "{% if can_restart_pods %}Run {{command}}{% else %}Contact DevOps for {{action}}{% endif %}"
"#;

fn setup() -> (PolicyEvaluator, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let evaluator = PolicyEvaluator::new(AuditDispatcher::new(3).with_sink(sink.clone()));
    PolicyFile::parse(POLICY)
        .expect("policy parses")
        .bootstrap(&evaluator)
        .expect("policy applies");
    (evaluator, sink)
}

fn doc(id: &str, level: SecurityLevel, tags: &[&str]) -> Document {
    Document::new(id, "confluence", level).with_tags(tags.iter().copied())
}

fn evaluation_count(sink: &MemorySink) -> usize {
    sink.read(|log| {
        log.query(&AuditQuery::default().with_entry_type(EntryType::Evaluation))
            .len()
    })
}

#[test]
fn software_engineer_never_sees_admin_only_documents() {
    let (evaluator, sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("alice", "software-engineer", "restart the pod").with_documents(
            vec![
                doc("1", SecurityLevel::Internal, &["admin-only"]),
                doc("2", SecurityLevel::Internal, &["howto"]),
            ],
        ),
    );

    let ids: Vec<&str> = result
        .filtered_documents
        .iter()
        .map(|d| d.id.as_str())
        .collect();
    assert_eq!(ids, ["2"]);

    let decisions = sink.read(|log| {
        log.get(result.audit_record_id)
            .and_then(|r| r.as_evaluation())
            .map(|e| e.decisions.clone())
            .unwrap_or_default()
    });
    assert_eq!(decisions[0].reason, FilterReason::DeniedTag);
    assert!(!decisions[0].included);
    assert_eq!(decisions[1].reason, FilterReason::Included);
}

#[test]
fn devops_engineer_sees_up_to_confidential() {
    let (evaluator, _sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("bob", "devops-engineer", "incident").with_documents(vec![
            doc("1", SecurityLevel::Internal, &[]),
            doc("3", SecurityLevel::Confidential, &[]),
            doc("4", SecurityLevel::Restricted, &[]),
        ]),
    );

    let ids: Vec<&str> = result
        .filtered_documents
        .iter()
        .map(|d| d.id.as_str())
        .collect();
    assert_eq!(ids, ["1", "3"]);
    assert_eq!(result.response.text(), "Found 2 document(s).");
}

#[test]
fn conditional_template_takes_then_branch() {
    let (evaluator, _sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("alice", "software-engineer", "restart")
            .with_intent("restart")
            .with_variable("requires_admin", true)
            .with_variable("action", "restart pod"),
    );
    assert_eq!(
        result.response,
        Response::Rendered("Contact DevOps for restart pod".into())
    );
    assert_eq!(result.warnings_count, 0);
}

#[test]
fn conditional_template_takes_else_branch() {
    let (evaluator, _sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("alice", "software-engineer", "restart")
            .with_intent("restart")
            .with_variable("requires_admin", false)
            .with_variable("command", "kubectl rollout restart deployment/x"),
    );
    assert_eq!(
        result.response,
        Response::Rendered("Run kubectl rollout restart deployment/x".into())
    );
}

#[test]
fn role_specific_template_uses_permission_flags() {
    let (evaluator, _sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("bob", "devops-engineer", "restart")
            .with_intent("restart")
            .with_variable("command", "kubectl rollout restart deployment/x")
            .with_variable("can_restart_pods", false),
    );
    // The caller cannot turn off a permission the role holds.
    assert_eq!(
        result.response,
        Response::Rendered("Run kubectl rollout restart deployment/x".into())
    );
}

#[test]
fn unknown_role_fails_closed_with_one_audit_record() {
    let (evaluator, sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("mallory", "ghost-role", "show secrets").with_documents(vec![
            doc("1", SecurityLevel::Public, &[]),
        ]),
    );

    assert_eq!(result.failure, Some(FailureKind::UnknownRole));
    assert!(result.filtered_documents.is_empty());
    assert!(result.response.is_denied());
    assert!(result.state_trace.contains(&EvaluationState::Logged));
    assert_eq!(result.final_state(), Some(EvaluationState::Failed));

    assert_eq!(evaluation_count(&sink), 1);
    let failure = sink.read(|log| log.get(result.audit_record_id).and_then(|r| r.failure()));
    assert_eq!(failure, Some(FailureKind::UnknownRole));
}

#[test]
fn audit_keeps_only_the_response_hash() {
    let (evaluator, sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("alice", "software-engineer", "q").with_documents(vec![doc(
            "2",
            SecurityLevel::Internal,
            &[],
        )]),
    );

    let outcome = sink.read(|log| {
        log.get(result.audit_record_id)
            .and_then(|r| r.as_evaluation())
            .map(|e| e.outcome.clone())
    });
    assert_eq!(
        outcome,
        Some(Outcome::Rendered {
            response_hash: response_hash("Found 1 document(s).")
        })
    );
}

#[test]
fn result_json_never_carries_reason_codes() {
    let (evaluator, _sink) = setup();
    let result = evaluator.evaluate(
        EvaluationRequest::new("alice", "software-engineer", "q").with_documents(vec![
            doc("1", SecurityLevel::Restricted, &[]),
            doc("2", SecurityLevel::Internal, &["admin-only"]),
        ]),
    );

    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"filteredDocuments\":[]"));
    assert!(json.contains("\"stateTrace\""));
    assert!(!json.contains("SECURITY_LEVEL"));
    assert!(!json.contains("DENIED_TAG"));
}

#[test]
fn retriever_results_are_filtered_in_order() {
    let (evaluator, _sink) = setup();
    let retriever = StaticRetriever::new(vec![
        doc("9", SecurityLevel::Public, &[]),
        doc("8", SecurityLevel::Restricted, &[]),
        doc("7", SecurityLevel::Internal, &[]),
    ]);

    let result = evaluator.retrieve_and_evaluate(
        &retriever,
        EvaluationRequest::new("alice", "software-engineer", "q"),
    );
    let ids: Vec<&str> = result
        .filtered_documents
        .iter()
        .map(|d| d.id.as_str())
        .collect();
    assert_eq!(ids, ["9", "7"]);
}

#[test]
fn concurrent_evaluations_and_writes_stay_consistent() {
    let (evaluator, sink) = setup();
    let evaluator = Arc::new(evaluator);
    let documents = vec![
        doc("1", SecurityLevel::Internal, &["admin-only"]),
        doc("2", SecurityLevel::Internal, &["howto"]),
    ];

    let readers: Vec<_> = (0..8)
        .map(|i| {
            let evaluator = Arc::clone(&evaluator);
            let documents = documents.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let result = evaluator.evaluate(
                        EvaluationRequest::new(format!("user-{i}"), "software-engineer", "q")
                            .with_documents(documents.clone()),
                    );
                    // Deny precedence holds under every published version.
                    assert!(
                        result
                            .filtered_documents
                            .iter()
                            .all(|d| !d.tags.contains("admin-only"))
                    );
                }
            })
        })
        .collect();

    let writer = {
        let evaluator = Arc::clone(&evaluator);
        thread::spawn(move || {
            for n in 0..10 {
                evaluator
                    .update_role(
                        &CallerId::new("admin"),
                        RoleDefinition::new("software-engineer", format!("Software Engineer v{n}"))
                            .with_max_level("internal")
                            .deny_tag("admin-only"),
                    )
                    .expect("update applies");
            }
        })
    };

    for reader in readers {
        reader.join().expect("reader thread");
    }
    writer.join().expect("writer thread");

    assert_eq!(evaluation_count(&sink), 8 * 25);
    let role = evaluator
        .registry_snapshot()
        .role(&RoleId::new("software-engineer"))
        .map(|r| r.version);
    assert_eq!(role, Some(11));
}

fn arb_document() -> impl Strategy<Value = Document> {
    (
        0u32..50,
        0u8..4,
        prop::sample::subsequence(vec!["admin-only", "howto", "runbook"], 0..3),
    )
        .prop_map(|(id, level, tags)| {
            Document::new(
                id.to_string(),
                "confluence",
                SecurityLevel::from_ordinal(level).unwrap_or_default(),
            )
            .with_tags(tags)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn evaluation_is_deterministic(docs in prop::collection::vec(arb_document(), 0..12)) {
        let (evaluator, _sink) = setup();
        let request = EvaluationRequest::new("alice", "software-engineer", "q").with_documents(docs);

        let first = evaluator.evaluate(request.clone());
        let second = evaluator.evaluate(request);

        prop_assert_eq!(&first.filtered_documents, &second.filtered_documents);
        prop_assert_eq!(&first.response, &second.response);
        prop_assert_ne!(first.audit_record_id, second.audit_record_id);
    }

    #[test]
    fn one_audit_record_per_evaluation(
        role in prop::sample::select(vec!["software-engineer", "devops-engineer", "ghost-role"]),
        intent in prop::sample::select(vec!["answer", "restart", "unknown-intent"]),
        docs in prop::collection::vec(arb_document(), 0..6),
    ) {
        let (evaluator, sink) = setup();
        let result = evaluator.evaluate(
            EvaluationRequest::new("alice", role, "q").with_intent(intent).with_documents(docs),
        );

        prop_assert_eq!(evaluation_count(&sink), 1);
        prop_assert!(result.state_trace.contains(&EvaluationState::Logged));
        if result.failure.is_some() {
            prop_assert!(result.filtered_documents.is_empty());
            prop_assert!(result.response.is_denied());
        }
    }
}
