//! rolegate command line.
//!
//! Evaluates queries against a policy file and inspects the audit trail.
//!
//! # Quick Start
//!
//! ```bash
//! # Evaluate a query as a role, with candidate documents from a file
//! rolegate evaluate --role software-engineer --query "restart the pod" \
//!     --documents docs.json --intent restart --var requires_admin=true --var action="restart pod"
//!
//! # Inspect the policy
//! rolegate roles
//! rolegate templates
//!
//! # Query the audit trail
//! rolegate audit --failed --format csv
//! rolegate summary
//! ```

mod commands;
mod session;
mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::audit::{AuditFormat, EntryFilter};

/// rolegate - role-aware retrieval filtering and response templating.
#[derive(Parser)]
#[command(name = "rolegate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding rolegate.toml (defaults to the current directory).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Policy file, overriding `[policy] file` from the configuration.
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a query under a role.
    Evaluate {
        /// Role the caller acts under.
        #[arg(short, long)]
        role: String,

        /// The user's query.
        #[arg(short, long)]
        query: String,

        /// Template intent (defaults to `[evaluator] default_intent`).
        #[arg(short, long)]
        intent: Option<String>,

        /// JSON file with the candidate documents, in ranking order.
        #[arg(short, long)]
        documents: Option<PathBuf>,

        /// Template variable as key=value (true/false for booleans, [a,b] for lists).
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Fail on unresolved or mistyped variables.
        #[arg(long)]
        strict: bool,

        /// Caller id recorded in the audit trail.
        #[arg(long, default_value = "cli")]
        caller: String,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List roles with their ceilings, tag rules and permissions.
    Roles,

    /// List and validate templates.
    Templates,

    /// Query the audit trail.
    Audit {
        /// Only records for this role.
        #[arg(short, long)]
        role: Option<String>,

        /// Only failed evaluations and rejected changes.
        #[arg(long)]
        failed: bool,

        /// Only this kind of record.
        #[arg(long = "type", value_enum)]
        entry_type: Option<EntryFilter>,

        /// Maximum number of records.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = AuditFormat::Table)]
        format: AuditFormat,
    },

    /// Per-role totals from the audit trail.
    Summary,

    /// Show version information.
    Version,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    style::set_no_color(cli.no_color);
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            style::print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let paths = session::PathOverrides {
        config_dir: cli.config_dir,
        policy: cli.policy,
    };

    match cli.command {
        Commands::Evaluate {
            role,
            query,
            intent,
            documents,
            vars,
            strict,
            caller,
            json,
        } => commands::evaluate::run(
            &paths,
            &commands::evaluate::EvaluateArgs {
                role,
                query,
                intent,
                documents,
                vars,
                strict,
                caller,
                json,
            },
        ),
        Commands::Roles => commands::roles::run(&paths).map(|()| ExitCode::SUCCESS),
        Commands::Templates => commands::templates::run(&paths).map(|()| ExitCode::SUCCESS),
        Commands::Audit {
            role,
            failed,
            entry_type,
            limit,
            format,
        } => commands::audit::run(
            &paths,
            &commands::audit::AuditArgs {
                role,
                failed,
                entry_type,
                limit,
                format,
            },
        )
        .map(|()| ExitCode::SUCCESS),
        Commands::Summary => commands::summary::run(&paths).map(|()| ExitCode::SUCCESS),
        Commands::Version => {
            commands::version::run();
            Ok(ExitCode::SUCCESS)
        }
    }
}
