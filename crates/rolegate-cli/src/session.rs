//! Configuration and policy loading shared by the commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rolegate::{PolicyEvaluator, PolicyFile};
use rolegate_audit::{AuditLog, AuditSink, JsonLinesSink, MemorySink, load_log};
use rolegate_config::{ConfigLoader, RolegateConfig};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Global path flags.
pub struct PathOverrides {
    pub config_dir: Option<PathBuf>,
    pub policy: Option<PathBuf>,
}

impl PathOverrides {
    /// Loads the layered configuration, applying `--policy` last.
    pub fn load_config(&self) -> Result<RolegateConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(dir) = &self.config_dir {
            loader = loader.with_project_dir(dir);
        }
        let mut config = loader.load().context("Failed to load configuration")?;

        if let Some(policy) = &self.policy {
            config.policy.file = std::path::absolute(policy)
                .with_context(|| format!("Invalid policy path {}", policy.display()))?;
        }
        Ok(config)
    }
}

/// A bootstrapped evaluator.
pub struct Session {
    pub config: RolegateConfig,
    pub evaluator: PolicyEvaluator,
}

/// Digest of the policy file last journaled, kept beside the audit log.
const POLICY_DIGEST_FILE: &str = "policy.sha256";

impl Session {
    /// Loads configuration and bootstraps the policy file.
    ///
    /// Bootstrap records always go to an in-memory sink. With `persist_audit`
    /// the configured JSON-lines log is attached afterwards, and the bootstrap
    /// records are copied into it only when the policy file differs from the
    /// one last journaled there.
    pub fn open(paths: &PathOverrides, persist_audit: bool) -> Result<Self> {
        let config = paths.load_config()?;
        let policy_path = &config.policy.file;

        let source = fs::read_to_string(policy_path)
            .with_context(|| format!("Failed to load policy {}", policy_path.display()))?;
        let policy = PolicyFile::parse_with_origin(&source, &policy_path.display().to_string())
            .context("Failed to load policy")?;

        let memory = Arc::new(MemorySink::new());
        let evaluator = PolicyEvaluator::from_config(&config, [memory.clone() as Arc<dyn AuditSink>]);
        let report = policy
            .bootstrap(&evaluator)
            .context("Failed to apply policy")?;
        debug!(?report, policy = %policy_path.display(), "Policy bootstrapped");

        if !persist_audit {
            return Ok(Self { config, evaluator });
        }

        let log_path = &config.audit.log_path;
        let fresh_log = !log_path.exists();
        let journal = JsonLinesSink::open(log_path)
            .with_context(|| format!("Failed to open audit log {}", log_path.display()))?;
        let evaluator = evaluator.with_sink(Arc::new(journal));
        journal_bootstrap(&evaluator, &memory, log_path, &source, fresh_log)?;

        Ok(Self { config, evaluator })
    }
}

/// Copies bootstrap records into the durable log when the policy changed.
fn journal_bootstrap(
    evaluator: &PolicyEvaluator,
    memory: &MemorySink,
    log_path: &Path,
    source: &str,
    fresh_log: bool,
) -> Result<()> {
    let marker = log_path.with_file_name(POLICY_DIGEST_FILE);
    let digest = policy_digest(source);

    if !fresh_log
        && let Ok(recorded) = fs::read_to_string(&marker)
        && recorded.trim() == digest
    {
        debug!(digest = %digest, "Policy unchanged since last journaled bootstrap");
        return Ok(());
    }

    let records = memory.read(|log| log.records().to_vec());
    let incomplete = records
        .iter()
        .filter(|record| !evaluator.audit().deliver(record).is_complete())
        .count();
    if incomplete > 0 {
        warn!(incomplete, "Bootstrap records not fully journaled, will retry next run");
        return Ok(());
    }

    fs::write(&marker, &digest)
        .with_context(|| format!("Failed to write {}", marker.display()))?;
    info!(records = records.len(), digest = %digest, "Journaled policy bootstrap");
    Ok(())
}

/// Lower-case hex SHA-256 of the policy file contents.
fn policy_digest(source: &str) -> String {
    Sha256::digest(source.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Reads the configured audit log; a missing file is an empty log.
pub fn read_audit_log(config: &RolegateConfig) -> Result<AuditLog> {
    if !config.audit.log_path.exists() {
        return Ok(AuditLog::new());
    }
    load_log(&config.audit.log_path)
        .with_context(|| format!("Failed to read audit log {}", config.audit.log_path.display()))
}
