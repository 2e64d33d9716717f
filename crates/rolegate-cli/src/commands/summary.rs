//! Summary command implementation.

use anyhow::Result;

use crate::session::{PathOverrides, read_audit_log};
use crate::style::{print_hint, print_table};

pub fn run(paths: &PathOverrides) -> Result<()> {
    let config = paths.load_config()?;
    let summaries = read_audit_log(&config)?.role_summary();

    if summaries.is_empty() {
        print_hint("No evaluations recorded yet");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|(role, summary)| {
            let excluded: Vec<String> = summary
                .documents_excluded
                .iter()
                .map(|(reason, count)| format!("{reason}={count}"))
                .collect();
            vec![
                role.to_string(),
                summary.evaluations.to_string(),
                summary.failures.to_string(),
                summary.documents_included.to_string(),
                if excluded.is_empty() {
                    "0".to_string()
                } else {
                    format!("{} ({})", summary.excluded_total(), excluded.join(", "))
                },
                summary.average_processing_ms().to_string(),
            ]
        })
        .collect();

    print_table(
        &["Role", "Evaluations", "Failures", "Included", "Excluded", "Avg ms"],
        &rows,
        "role",
    );
    Ok(())
}
