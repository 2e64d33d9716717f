//! Roles command implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;

use crate::session::{PathOverrides, Session};
use crate::style::print_table;

pub fn run(paths: &PathOverrides) -> Result<()> {
    let session = Session::open(paths, false)?;
    let snapshot = session.evaluator.registry_snapshot();

    let rows: Vec<Vec<String>> = snapshot
        .roles()
        .map(|role| {
            let inherited = role
                .permission_set
                .as_ref()
                .and_then(|id| snapshot.permission_set(id))
                .map(Arc::as_ref);
            let permissions: Vec<String> = role
                .effective_permissions(inherited)
                .into_iter()
                .map(|p| {
                    if p.is_high_risk() {
                        format!("{p} (high risk)")
                    } else {
                        p.to_string()
                    }
                })
                .collect();

            vec![
                role.id.to_string(),
                role.name.clone(),
                if role.enabled { "yes" } else { "no" }.to_string(),
                role.max_security_level.to_string(),
                join_or(&role.allowed_sources, "any"),
                join_or(&role.allowed_tags, "any"),
                join_or(&role.denied_tags, "-"),
                if permissions.is_empty() {
                    "-".to_string()
                } else {
                    permissions.join(", ")
                },
            ]
        })
        .collect();

    print_table(
        &[
            "ID",
            "Name",
            "Enabled",
            "Ceiling",
            "Sources",
            "Allowed tags",
            "Denied tags",
            "Permissions",
        ],
        &rows,
        "role",
    );
    Ok(())
}

fn join_or(set: &BTreeSet<String>, empty: &str) -> String {
    if set.is_empty() {
        empty.to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}
