//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read rolegate config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed rolegate config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A setting parsed but the evaluator cannot run with it.
    #[error("Invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: &'static str },

    #[error("No home directory; cannot locate user config")]
    NoHomeDirectory,
}
