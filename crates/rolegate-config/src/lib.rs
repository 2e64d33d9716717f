//! Configuration management for rolegate
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence)
//! 2. Environment variables (ROLEGATE_* prefix, `__` between section and key)
//! 3. rolegate.local.toml (gitignored, local overrides)
//! 4. rolegate.toml (git-tracked, project config)
//! 5. ~/.config/rolegate/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Message returned to callers whose evaluation was denied.
pub const DEFAULT_DENIAL_MESSAGE: &str = "You do not have access to an answer for this request.";

/// Main rolegate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolegateConfig {
    pub evaluator: EvaluatorConfig,
    pub templates: TemplatesConfig,
    pub audit: AuditConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Fail evaluations on unresolved or mistyped variables instead of warning.
    pub strict_rendering: bool,
    pub denial_message: String,
    /// Intent used when a request does not name one.
    pub default_intent: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            strict_rendering: false,
            denial_message: DEFAULT_DENIAL_MESSAGE.to_string(),
            default_intent: "answer".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Loop iteration cap for templates that do not declare one.
    pub default_iteration_cap: usize,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            default_iteration_cap: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub max_delivery_attempts: u32,
    pub log_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 3,
            log_path: PathBuf::from(".rolegate/audit.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub file: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("policy.toml"),
        }
    }
}

impl RolegateConfig {
    /// Reads a single TOML file, without layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the evaluator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluator.default_intent.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "evaluator.default_intent",
                reason: "must not be empty",
            });
        }
        if self.evaluator.denial_message.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "evaluator.denial_message",
                reason: "must not be empty",
            });
        }
        if self.templates.default_iteration_cap == 0 {
            return Err(ConfigError::Invalid {
                key: "templates.default_iteration_cap",
                reason: "must be at least 1",
            });
        }
        if self.audit.max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "audit.max_delivery_attempts",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.audit.log_path.is_relative() {
            self.audit.log_path = base.join(&self.audit.log_path);
        }

        if self.policy.file.is_relative() {
            self.policy.file = base.join(&self.policy.file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RolegateConfig::default();
        assert!(!config.evaluator.strict_rendering);
        assert_eq!(config.evaluator.denial_message, DEFAULT_DENIAL_MESSAGE);
        assert_eq!(config.evaluator.default_intent, "answer");
        assert_eq!(config.templates.default_iteration_cap, 25);
        assert_eq!(config.audit.max_delivery_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_resolution() {
        let mut config = RolegateConfig::default();
        config.resolve_paths("/srv/assistant");

        assert_eq!(
            config.audit.log_path,
            PathBuf::from("/srv/assistant/.rolegate/audit.jsonl")
        );
        assert_eq!(config.policy.file, PathBuf::from("/srv/assistant/policy.toml"));
    }

    #[test]
    fn test_absolute_paths_untouched() {
        let mut config = RolegateConfig::default();
        config.policy.file = PathBuf::from("/etc/rolegate/policy.toml");
        config.resolve_paths("/srv/assistant");
        assert_eq!(config.policy.file, PathBuf::from("/etc/rolegate/policy.toml"));
    }

    #[test]
    fn test_validation() {
        let mut config = RolegateConfig::default();
        config.templates.default_iteration_cap = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "templates.default_iteration_cap",
                ..
            })
        ));

        let mut config = RolegateConfig::default();
        config.evaluator.default_intent = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = RolegateConfig::default();
        config.audit.max_delivery_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[evaluator]\nstrict_rendering = true\n").unwrap();

        let config = RolegateConfig::from_file(&path).unwrap();
        assert!(config.evaluator.strict_rendering);
        assert_eq!(config.evaluator.default_intent, "answer");

        std::fs::write(&path, "[evaluator\n").unwrap();
        assert!(matches!(
            RolegateConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            RolegateConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
