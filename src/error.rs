//! Error types for pipewright operations.
//!
//! This module defines [`PipewrightError`], the primary error type used
//! throughout the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Structural problems with a workflow surface as [`PipewrightError::Validation`]
//!   (or one of the resolver-specific variants) before any step runs
//! - Per-step failures on optional steps never reach this type; the engine
//!   turns them into skip records
//! - Plugin code returns `anyhow::Error`, wrapped via [`PipewrightError::Other`]
//!   or flattened into [`PipewrightError::StepExecution`]

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::plugin::PluginLoadError;

/// Why a duplication lock could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another holder owns a live lock.
    InProgress,
    /// The target's run record is still heart-beating.
    RunInProgress,
    /// The target already has a registered run; nothing was touched.
    AlreadyExists,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::InProgress => write!(f, "duplicate in progress"),
            ConflictReason::RunInProgress => write!(f, "a run is already in progress"),
            ConflictReason::AlreadyExists => write!(f, "target already exists"),
        }
    }
}

/// Core error type for pipewright operations.
#[derive(Debug, Error)]
pub enum PipewrightError {
    /// The workflow definition is malformed. Carries every problem found.
    #[error("Invalid workflow: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// Steps that could not be ordered because they sit on (or behind) a cycle.
    #[error("Cyclic dependency detected involving steps: {}", steps.join(", "))]
    CyclicDependency { steps: Vec<String> },

    /// A `depends_on` entry names a step that is not defined.
    #[error("Step '{step}' depends on non-existent step '{dependency}'")]
    MissingDependency { step: String, dependency: String },

    /// An external plugin failed to load.
    #[error(transparent)]
    PluginLoad(#[from] PluginLoadError),

    /// Registry lookup miss.
    #[error("Plugin '{id}' not found")]
    PluginNotFound { id: String },

    /// `register` was called with an id that is already present.
    #[error("Plugin '{id}' is already registered")]
    PluginAlreadyRegistered { id: String },

    /// A required step references a plugin that is not registered.
    #[error("Plugin '{plugin}' not found for step '{step}'")]
    StepPluginMissing { step: String, plugin: String },

    /// Input or config validation failed for a step.
    #[error("Step '{step}' validation failed: {}", errors.join("; "))]
    StepValidation { step: String, errors: Vec<String> },

    /// The plugin returned an error from `run`.
    #[error("Step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    /// The target is locked by someone else or already produced.
    #[error("Cannot acquire '{target}': {reason}")]
    LockConflict {
        target: String,
        reason: ConflictReason,
    },

    /// Target identities must be filesystem-safe slugs.
    #[error("Invalid target id '{target}': only letters, digits, '-' and '_' are allowed")]
    InvalidTarget { target: String },

    /// A configuration, workflow, or record file was expected but is missing.
    #[error("Configuration not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse a configuration, workflow, or record file.
    #[error("Failed to parse {}: {message}", path.display())]
    ConfigParseError { path: PathBuf, message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipewrightError {
    /// Whether this is a lock conflict of any kind.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PipewrightError::LockConflict { .. })
    }
}

/// Result type alias for pipewright operations.
pub type Result<T> = std::result::Result<T, PipewrightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_joins_all_messages() {
        let err = PipewrightError::Validation {
            errors: vec!["first problem".into(), "second problem".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("first problem"));
        assert!(msg.contains("second problem"));
    }

    #[test]
    fn cyclic_dependency_names_every_step() {
        let err = PipewrightError::CyclicDependency {
            steps: vec!["a".into(), "b".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("a"));
        assert!(msg.contains("b"));
    }

    #[test]
    fn missing_dependency_displays_both_ids() {
        let err = PipewrightError::MissingDependency {
            step: "embed".into(),
            dependency: "ghost".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("embed"));
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn step_plugin_missing_names_plugin_and_step() {
        let err = PipewrightError::StepPluginMissing {
            step: "cluster".into(),
            plugin: "analysis.kmeans".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cluster"));
        assert!(msg.contains("analysis.kmeans"));
    }

    #[test]
    fn lock_conflict_displays_reason() {
        let err = PipewrightError::LockConflict {
            target: "report-1".into(),
            reason: ConflictReason::InProgress,
        };
        assert!(err.to_string().contains("duplicate in progress"));
        assert!(err.is_conflict());

        let err = PipewrightError::LockConflict {
            target: "report-1".into(),
            reason: ConflictReason::AlreadyExists,
        };
        assert!(err.to_string().contains("target already exists"));

        let err = PipewrightError::LockConflict {
            target: "report-1".into(),
            reason: ConflictReason::RunInProgress,
        };
        assert_eq!(
            err.to_string(),
            "Cannot acquire 'report-1': a run is already in progress"
        );
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: PipewrightError = io_err.into();
        assert!(matches!(err, PipewrightError::Io(_)));
        assert!(!err.is_conflict());
    }
}
