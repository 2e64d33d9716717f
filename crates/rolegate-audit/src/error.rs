use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to read audit log {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed audit log line {line} in {path}: {source}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Error returned by an [`AuditSink`](crate::AuditSink) that failed to persist a record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}
