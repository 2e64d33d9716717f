use std::path::PathBuf;

use rolegate_audit::ChangeKind;
use rolegate_rbac::RegistryError;
use rolegate_template::StoreError;
use rolegate_types::FailureKind;
use thiserror::Error;

/// Error returned by an administrative write on the evaluator.
///
/// The rejection is already in the audit trail by the time this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Template(#[from] StoreError),
}

impl AdminError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AdminError::Registry(err) => err.failure_kind(),
            AdminError::Template(err) => err.failure_kind(),
        }
    }
}

/// Error loading or applying a policy file.
#[derive(Debug, Error)]
pub enum PolicyFileError {
    #[error("Failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse policy file {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },

    #[error("Policy file entry rejected ({} '{target}'): {source}", .change.as_str())]
    Rejected {
        change: ChangeKind,
        target: String,
        source: AdminError,
    },
}

/// Result type for administrative writes.
pub type Result<T> = std::result::Result<T, AdminError>;
