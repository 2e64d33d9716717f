//! Evaluate command implementation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use rolegate::{EvaluationRequest, Response, StaticRetriever};
use rolegate_template::{Context as Variables, Value};
use rolegate_types::Document;

use crate::session::{PathOverrides, Session};
use crate::style::colors::SemanticStyle;
use crate::style::{print_header, print_labeled, print_spacer, print_success, print_warn};

/// Exit code for an evaluation that was denied.
const DENIED: u8 = 2;

pub struct EvaluateArgs {
    pub role: String,
    pub query: String,
    pub intent: Option<String>,
    pub documents: Option<PathBuf>,
    pub vars: Vec<String>,
    pub strict: bool,
    pub caller: String,
    pub json: bool,
}

pub fn run(paths: &PathOverrides, args: &EvaluateArgs) -> Result<ExitCode> {
    let variables = args
        .vars
        .iter()
        .map(|raw| parse_var(raw))
        .collect::<Result<Variables>>()?;
    let documents = match &args.documents {
        Some(path) => read_documents(path)?,
        None => Vec::new(),
    };
    let candidates = documents.len();

    let session = Session::open(paths, true)?;

    let mut request = EvaluationRequest::new(args.caller.as_str(), args.role.as_str(), args.query.as_str())
        .with_variables(variables);
    if let Some(intent) = &args.intent {
        request = request.with_intent(intent.as_str());
    }
    if args.strict {
        request = request.strict(true);
    }

    let retriever = StaticRetriever::new(documents);
    let result = session.evaluator.retrieve_and_evaluate(&retriever, request);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_header("Response");
        match &result.response {
            Response::Rendered(text) => println!("  {text}"),
            Response::Denied(text) => print_warn(text),
        }
        print_spacer();

        print_labeled("Role", &args.role);
        print_labeled(
            "Documents",
            &format!("{} of {candidates} included", result.filtered_documents.len()),
        );
        if !result.filtered_documents.is_empty() {
            let ids: Vec<&str> = result
                .filtered_documents
                .iter()
                .map(|d| d.id.as_str())
                .collect();
            print_labeled("Document ids", &ids.join(", "));
        }
        if result.warnings_count > 0 {
            print_labeled("Warnings", &result.warnings_count.to_string().warning());
        }
        if let Some(failure) = result.failure {
            print_labeled("Failure", &failure.as_str().error());
        }
        let trace: Vec<&str> = result.state_trace.iter().map(|s| s.as_str()).collect();
        print_labeled("States", &trace.join(" → "));
        print_labeled("Audit record", &result.audit_record_id.to_string());
        print_labeled(
            "Audit log",
            &session.config.audit.log_path.display().to_string().code(),
        );

        if result.is_success() {
            print_spacer();
            print_success("Evaluation granted");
        }
    }

    if !result.audit_delivered {
        print_warn("Audit record could not be written to every sink");
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(DENIED)
    })
}

fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file {}", path.display()))?;
    serde_json::from_str(&source)
        .with_context(|| format!("Documents file {} is not a JSON array of documents", path.display()))
}

/// Parses `key=value`.
///
/// `true`/`false` become booleans and `[a, b]` becomes a list; anything else
/// is a string.
fn parse_var(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid --var '{raw}': expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --var '{raw}': empty key");
    }

    let value = match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        list if list.starts_with('[') && list.ends_with(']') => {
            let inner = &list[1..list.len() - 1];
            Value::List(
                inner
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect(),
            )
        }
        text => Value::Str(text.to_string()),
    };
    Ok((key.to_string(), value))
}
