//! Application layer errors.
//!
//! These errors represent failures while executing blueprints: missing files,
//! bad modifier parameters, failed commands. Problems with the module
//! selection itself are `ResolutionIssue`s from `crate::domain::resolver`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::ErrorCategory;

/// Errors that occur during blueprint execution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApplicationError {
    /// A modifier rejected its parameters. Lists every offending field.
    #[error("Invalid parameters for modifier '{modifier}': {}", fields.join("; "))]
    ParameterValidation {
        modifier: String,
        fields: Vec<String>,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("File already exists: {path}")]
    FileAlreadyExists { path: String },

    /// A `CREATE_FILE` with the `error` conflict policy hit an existing file.
    #[error("Conflicting write to {path} (existing content kept)")]
    FileConflict { path: String },

    #[error("Modifier '{name}' is not registered")]
    ModifierNotFound { name: String, available: Vec<String> },

    #[error("Modifier '{modifier}' does not support {path}")]
    UnsupportedFileType {
        modifier: String,
        path: String,
        supported: Vec<String>,
    },

    #[error("Modifier '{modifier}' failed on {path}: {reason}")]
    ModifierFailed {
        modifier: String,
        path: String,
        reason: String,
    },

    #[error("Command `{command}` failed{}: {stderr}", code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("No blueprint found for module '{module}'")]
    BlueprintNotFound { module: String },

    #[error("Timed out after {}s: {operation}", elapsed.as_secs())]
    Timeout { operation: String, elapsed: Duration },

    #[error("Run cancelled")]
    Cancelled,

    /// Filesystem operation failed.
    #[error("Filesystem error at {path}: {reason}")]
    FilesystemError { path: PathBuf, reason: String },
}

impl ApplicationError {
    /// Stable error code, shared with reports and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParameterValidation { .. } => "PARAMETER_VALIDATION",
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::FileAlreadyExists { .. } => "FILE_ALREADY_EXISTS",
            Self::FileConflict { .. } => "FILE_CONFLICT",
            Self::ModifierNotFound { .. } => "MODIFIER_NOT_FOUND",
            Self::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            Self::ModifierFailed { .. } => "MODIFIER_FAILED",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::BlueprintNotFound { .. } => "BLUEPRINT_NOT_FOUND",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::FilesystemError { .. } => "FILESYSTEM_ERROR",
        }
    }

    /// Get user-actionable suggestions.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ParameterValidation { fields, .. } => fields
                .iter()
                .map(|f| format!("Fix parameter: {f}"))
                .collect(),
            Self::FileNotFound { path } => vec![
                format!("'{}' does not exist yet", path),
                "Create it in an earlier action or module".into(),
                "Or set fallback = \"create\" on the action".into(),
            ],
            Self::FileAlreadyExists { path } => vec![
                format!("Another action already wrote '{}'", path),
                "Add a conflict policy: skip, replace or merge".into(),
            ],
            Self::FileConflict { path } => vec![format!(
                "Change the conflict strategy for '{}' to skip, replace or merge",
                path
            )],
            Self::ModifierNotFound { available, .. } => vec![
                format!("Available modifiers: {}", available.join(", ")),
                "Try: kiln modifiers".into(),
            ],
            Self::UnsupportedFileType { supported, .. } => {
                vec![format!("Supported file types: {}", supported.join(", "))]
            }
            Self::CommandFailed { command, .. } => vec![
                format!("Run `{}` manually to see the full output", command),
                "Use --dry-run to skip commands".into(),
            ],
            Self::BlueprintNotFound { module } => vec![
                format!("Add a blueprint to the '{}' module directory", module),
                "Check --modules points at the right catalog".into(),
            ],
            Self::Timeout { .. } => vec!["Increase the timeout with --timeout".into()],
            Self::FilesystemError { path, .. } => vec![
                format!("Failed to access: {}", path.display()),
                "Check that you have write permissions".into(),
            ],
            _ => vec!["Check the error details above".into()],
        }
    }

    /// Get error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParameterValidation { .. } | Self::UnsupportedFileType { .. } => {
                ErrorCategory::Validation
            }
            Self::FileAlreadyExists { .. } | Self::FileConflict { .. } => ErrorCategory::Conflict,
            Self::FileNotFound { .. }
            | Self::ModifierNotFound { .. }
            | Self::BlueprintNotFound { .. } => ErrorCategory::NotFound,
            Self::CommandFailed { .. } | Self::ModifierFailed { .. } | Self::Timeout { .. } => {
                ErrorCategory::Execution
            }
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::FilesystemError { .. } => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_validation_lists_every_field() {
        let err = ApplicationError::ParameterValidation {
            modifier: "json-merge".into(),
            fields: vec!["merge: required".into(), "deep: expected boolean".into()],
        };
        let message = err.to_string();
        assert!(message.contains("merge: required"));
        assert!(message.contains("deep: expected boolean"));
        assert_eq!(err.suggestions().len(), 2);
    }

    #[test]
    fn command_failure_mentions_exit_code() {
        let err = ApplicationError::CommandFailed {
            command: "npm install".into(),
            code: Some(2),
            stderr: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "Command `npm install` failed with exit code 2: boom"
        );
        assert_eq!(err.code(), "COMMAND_FAILED");
    }
}
