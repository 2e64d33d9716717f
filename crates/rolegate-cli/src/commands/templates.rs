//! Templates command implementation.
//!
//! Every template is parsed and type-checked while the policy bootstraps, so
//! reaching the listing means all of them are valid.

use anyhow::Result;

use crate::session::{PathOverrides, Session};
use crate::style::{print_success, print_table};

pub fn run(paths: &PathOverrides) -> Result<()> {
    let session = Session::open(paths, false)?;
    let snapshot = session.evaluator.template_snapshot();

    let rows: Vec<Vec<String>> = snapshot
        .templates()
        .map(|template| {
            let variables: Vec<String> = template
                .body
                .variables
                .iter()
                .map(|(name, ty)| format!("{name}: {ty}"))
                .collect();
            vec![
                template.id.to_string(),
                template.intent.clone(),
                template
                    .role_id
                    .as_ref()
                    .map_or_else(|| "(global)".to_string(), ToString::to_string),
                variables.join(", "),
                template.iteration_cap.to_string(),
                template.version.to_string(),
            ]
        })
        .collect();

    print_table(
        &["ID", "Intent", "Role", "Variables", "Loop cap", "Version"],
        &rows,
        "template",
    );
    print_success(&format!(
        "All templates valid ({})",
        session.config.policy.file.display()
    ));
    Ok(())
}
