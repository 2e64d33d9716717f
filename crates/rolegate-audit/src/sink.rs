//! Audit persistence sinks.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::error::{AuditError, Result, SinkError};
use crate::log::AuditLog;
use crate::record::AuditRecord;

/// Durable destination for audit records.
///
/// Implementations must be idempotent on [`AuditRecord::id`]: persisting the
/// same record twice stores it once. The dispatcher relies on this to retry
/// without duplicating.
pub trait AuditSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn persist(&self, record: &AuditRecord) -> std::result::Result<(), SinkError>;
}

// ============================================================================
// In-memory sink
// ============================================================================

/// Sink backed by an in-memory [`AuditLog`].
#[derive(Debug, Default)]
pub struct MemorySink {
    log: RwLock<AuditLog>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the current log.
    pub fn read<T>(&self, f: impl FnOnce(&AuditLog) -> T) -> T {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        f(&log)
    }

    /// Clones the current log.
    pub fn snapshot(&self) -> AuditLog {
        self.read(AuditLog::clone)
    }

    pub fn count(&self) -> usize {
        self.read(AuditLog::count)
    }
}

impl AuditSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn persist(&self, record: &AuditRecord) -> std::result::Result<(), SinkError> {
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        log.append(record.clone());
        Ok(())
    }
}

// ============================================================================
// JSON-lines file sink
// ============================================================================

/// Sink appending one JSON record per line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    written: Mutex<HashSet<Uuid>>,
}

impl JsonLinesSink {
    /// Opens (or creates) the log file, remembering ids already written.
    pub fn open(path: impl Into<PathBuf>) -> std::result::Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let written = if path.exists() {
            load_log(&path)
                .map_err(|e| SinkError::Unavailable(e.to_string()))?
                .records()
                .iter()
                .map(|r| r.id)
                .collect()
        } else {
            HashSet::new()
        };

        debug!(path = %path.display(), existing = written.len(), "Opened audit log file");
        Ok(Self {
            path,
            written: Mutex::new(written),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn persist(&self, record: &AuditRecord) -> std::result::Result<(), SinkError> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if written.contains(&record.id) {
            return Ok(());
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        written.insert(record.id);
        Ok(())
    }
}

/// Reads a JSON-lines audit file into an [`AuditLog`].
///
/// Blank lines are skipped; any other unparsable line is an error.
pub fn load_log(path: &Path) -> Result<AuditLog> {
    let file = File::open(path).map_err(|source| AuditError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut log = AuditLog::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| AuditError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: AuditRecord =
            serde_json::from_str(&line).map_err(|source| AuditError::MalformedLine {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })?;
        log.append(record);
    }
    Ok(log)
}
