//! Unified error handling for Kiln Core.
//!
//! This module provides a unified error type that wraps domain, resolution and
//! application errors, with stable codes and user-actionable suggestions.

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::{DomainError, ResolutionIssue};

/// Root error type for Kiln Core operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KilnError {
    /// Errors from the domain layer (invalid versions, paths, templates).
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Errors from the application layer (execution failures).
    #[error("{0}")]
    Application(#[from] ApplicationError),

    /// The module selection could not be resolved. Nothing was executed.
    #[error("Module resolution failed with {} error(s)", issues.len())]
    Resolution { issues: Vec<ResolutionIssue> },

    /// Configuration or setup errors.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unexpected internal errors (bugs).
    #[error("Internal error: {message}. This is a bug, please report it.")]
    Internal { message: String },
}

impl KilnError {
    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(e) => e.code(),
            Self::Application(e) => e.code(),
            Self::Resolution { issues } => match issues.as_slice() {
                [only] => only.code.as_str(),
                _ => "RESOLUTION_FAILED",
            },
            Self::Configuration { .. } => "CONFIGURATION",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Domain(e) => e.suggestions(),
            Self::Application(e) => e.suggestions(),
            Self::Resolution { issues } => issues
                .iter()
                .flat_map(|issue| issue.suggestions.iter().cloned())
                .collect(),
            Self::Configuration { message } => vec![
                format!("Configuration issue: {}", message),
                "Check your setup and try again".into(),
            ],
            Self::Internal { .. } => vec![
                "This appears to be a bug in Kiln".into(),
                "Please report this issue at: https://github.com/cosecruz/kiln/issues".into(),
            ],
        }
    }

    /// Get error category for display/styling purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Domain(e) => match e.category() {
                crate::domain::ErrorCategory::Validation => ErrorCategory::Validation,
                crate::domain::ErrorCategory::Compatibility => ErrorCategory::Compatibility,
                crate::domain::ErrorCategory::NotFound => ErrorCategory::NotFound,
                crate::domain::ErrorCategory::Internal => ErrorCategory::Internal,
            },
            Self::Application(e) => e.category(),
            Self::Resolution { .. } => ErrorCategory::Compatibility,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether the error should stop the whole run, not just one module.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. }
                | Self::Configuration { .. }
                | Self::Application(ApplicationError::Cancelled)
        )
    }
}

/// Error categories for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Compatibility,
    Conflict,
    NotFound,
    Execution,
    Cancelled,
    Configuration,
    Internal,
}

/// Convenient result type alias.
pub type KilnResult<T> = Result<T, KilnError>;

/// Extension trait for adding context to errors.
pub trait Context<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> KilnResult<T>;
}

impl<T, E> Context<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: impl Into<String>) -> KilnResult<T> {
        self.map_err(|e| KilnError::Internal {
            message: format!("{}: {}", msg.into(), e),
        })
    }
}
