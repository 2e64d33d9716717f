//! Template context assembly.

use rolegate_rbac::{Permission, ResolvedRole};
use rolegate_template::{Context, Value};
use rolegate_types::Document;
use tracing::debug;

/// Keys the evaluator always sets, in addition to one `can_*` flag per permission.
pub const SYSTEM_KEYS: [&str; 8] = [
    "query",
    "intent",
    "role_id",
    "role_name",
    "document_count",
    "has_documents",
    "document_ids",
    "document_sources",
];

/// Builds the render context for one evaluation.
///
/// Starts from the caller's variables and overlays the system keys, so a
/// caller can never spoof `role_id` or a permission flag. `documents` must be
/// the filtered set: excluded documents never reach the template.
pub fn build_context(
    role: &ResolvedRole,
    query: &str,
    intent: &str,
    documents: &[Document],
    variables: &Context,
) -> Context {
    let mut context = variables.clone();
    let mut set = |key: String, value: Value| {
        if context.insert(key.as_str(), value).is_some() {
            debug!(key = %key, "Caller variable replaced by system value");
        }
    };

    set("query".into(), query.into());
    set("intent".into(), intent.into());
    set("role_id".into(), role.id().as_str().into());
    set("role_name".into(), role.role().name.as_str().into());
    set("document_count".into(), documents.len().to_string().into());
    set("has_documents".into(), (!documents.is_empty()).into());
    set(
        "document_ids".into(),
        Value::List(documents.iter().map(|d| d.id.to_string()).collect()),
    );
    set("document_sources".into(), Value::List(distinct_sources(documents)));

    for permission in Permission::ALL {
        set(permission.context_key(), role.has_permission(permission).into());
    }

    context
}

/// Source types in first-seen order, without repeats.
fn distinct_sources(documents: &[Document]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for document in documents {
        if !sources.contains(&document.source_type) {
            sources.push(document.source_type.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_rbac::{PermissionSetDefinition, RoleDefinition, RoleRegistry};
    use rolegate_types::{RoleId, SecurityLevel};

    fn devops() -> ResolvedRole {
        let registry = RoleRegistry::new();
        registry
            .create_permission_set(
                PermissionSetDefinition::new("operators", "Operators")
                    .grant("restart-pods")
                    .grant("view-logs"),
            )
            .unwrap();
        registry
            .create_role(
                RoleDefinition::new("devops-engineer", "DevOps Engineer")
                    .inherit("operators")
                    .revoke("view-logs"),
            )
            .unwrap();
        registry.resolve_role(&RoleId::new("devops-engineer")).unwrap()
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("1", "confluence", SecurityLevel::Internal),
            Document::new("2", "github", SecurityLevel::Internal),
            Document::new("3", "confluence", SecurityLevel::Public),
        ]
    }

    #[test]
    fn system_keys_are_populated() {
        let context = build_context(&devops(), "restart x", "answer", &docs(), &Context::new());

        for key in SYSTEM_KEYS {
            assert!(context.get(key).is_some(), "missing {key}");
        }
        assert_eq!(context.get("role_name"), Some(&Value::from("DevOps Engineer")));
        assert_eq!(context.get("document_count"), Some(&Value::from("3")));
        assert_eq!(context.get("has_documents"), Some(&Value::Bool(true)));
        assert_eq!(
            context.get("document_ids"),
            Some(&Value::from(vec!["1", "2", "3"]))
        );
    }

    #[test]
    fn sources_are_deduplicated_in_first_seen_order() {
        let context = build_context(&devops(), "q", "answer", &docs(), &Context::new());
        assert_eq!(
            context.get("document_sources"),
            Some(&Value::from(vec!["confluence", "github"]))
        );
    }

    #[test]
    fn every_permission_gets_a_flag() {
        let context = build_context(&devops(), "q", "answer", &[], &Context::new());

        assert_eq!(context.get("can_restart_pods"), Some(&Value::Bool(true)));
        // Revoked at role level despite the inherited grant.
        assert_eq!(context.get("can_view_logs"), Some(&Value::Bool(false)));
        assert_eq!(context.get("can_access_secrets"), Some(&Value::Bool(false)));
        assert_eq!(context.get("has_documents"), Some(&Value::Bool(false)));
        assert_eq!(context.len(), SYSTEM_KEYS.len() + Permission::ALL.len());
    }

    #[test]
    fn system_keys_win_over_caller_variables() {
        let variables = Context::new()
            .with("role_id", "admin")
            .with("can_access_secrets", true)
            .with("action", "restart pod");

        let context = build_context(&devops(), "q", "answer", &[], &variables);

        assert_eq!(context.get("role_id"), Some(&Value::from("devops-engineer")));
        assert_eq!(context.get("can_access_secrets"), Some(&Value::Bool(false)));
        assert_eq!(context.get("action"), Some(&Value::from("restart pod")));
    }
}
