//! Audit command implementation.

use anyhow::Result;
use clap::ValueEnum;
use rolegate_audit::{
    AuditEntry, AuditQuery, AuditRecord, ChangeResult, EntryType, Outcome,
};

use crate::session::{PathOverrides, read_audit_log};
use crate::style::colors::SemanticStyle;
use crate::style::{print_hint, print_table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuditFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntryFilter {
    Evaluation,
    PolicyChange,
}

impl From<EntryFilter> for EntryType {
    fn from(filter: EntryFilter) -> Self {
        match filter {
            EntryFilter::Evaluation => EntryType::Evaluation,
            EntryFilter::PolicyChange => EntryType::PolicyChange,
        }
    }
}

pub struct AuditArgs {
    pub role: Option<String>,
    pub failed: bool,
    pub entry_type: Option<EntryFilter>,
    pub limit: Option<usize>,
    pub format: AuditFormat,
}

impl AuditArgs {
    fn query(&self) -> AuditQuery {
        let mut query = AuditQuery::default();
        if let Some(role) = &self.role {
            query = query.with_role(role.as_str());
        }
        if self.failed {
            query = query.failures_only();
        }
        if let Some(entry_type) = self.entry_type {
            query = query.with_entry_type(entry_type.into());
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        query
    }
}

pub fn run(paths: &PathOverrides, args: &AuditArgs) -> Result<()> {
    let config = paths.load_config()?;
    let log = read_audit_log(&config)?;
    let query = args.query();

    match args.format {
        AuditFormat::Json => println!("{}", log.export_json(&query)?),
        AuditFormat::Csv => print!("{}", log.export_csv(&query)),
        AuditFormat::Table => {
            let records = log.query(&query);
            if records.is_empty() {
                print_hint(&format!(
                    "No audit records match in {}",
                    config.audit.log_path.display().to_string().code()
                ));
                return Ok(());
            }
            let rows: Vec<Vec<String>> = records.into_iter().map(row).collect();
            print_table(
                &["Time", "Caller", "Type", "Subject", "Outcome", "Detail"],
                &rows,
                "record",
            );
        }
    }
    Ok(())
}

fn row(record: &AuditRecord) -> Vec<String> {
    let (subject, outcome, detail) = match &record.entry {
        AuditEntry::Evaluation(entry) => {
            let outcome = match &entry.outcome {
                Outcome::Rendered { .. } => "rendered".success(),
                Outcome::Failed { failure, .. } => failure.as_str().error(),
            };
            let excluded = entry.decisions.len() - entry.included_count();
            (
                entry.role_id.to_string(),
                outcome,
                format!(
                    "intent={} included={} excluded={}",
                    entry.intent,
                    entry.included_count(),
                    excluded
                ),
            )
        }
        AuditEntry::PolicyChange(entry) => {
            let outcome = match &entry.result {
                ChangeResult::Applied { version } => format!("applied v{version}").success(),
                ChangeResult::Rejected { failure, .. } => failure.as_str().error(),
            };
            (
                entry.target.clone(),
                outcome,
                entry.change.as_str().to_string(),
            )
        }
    };

    vec![
        record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        record.caller_id.to_string(),
        record.entry_type().as_str().to_string(),
        subject,
        outcome,
        detail,
    ]
}
