// ============================================================================
// domain/error.rs - DOMAIN ERRORS
// ============================================================================

use thiserror::Error;

/// Root domain error type.
///
/// All errors are:
/// - Cloneable (reports keep copies per module)
/// - Categorizable (for CLI display)
/// - Actionable (provides suggestions)
/// - Coded (stable machine-readable `code()`)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid version range '{input}': {reason}")]
    InvalidVersionRange { input: String, reason: String },

    #[error("Invalid capability declaration '{0}'")]
    InvalidCapability(String),

    #[error("Invalid module id '{0}'")]
    InvalidModuleId(String),

    #[error("Invalid blueprint: {0}")]
    InvalidBlueprint(String),

    #[error("Absolute paths not allowed: {path}")]
    AbsolutePathNotAllowed { path: String },

    #[error("Path escapes the project root: {path}")]
    PathEscapesRoot { path: String },

    #[error("Path is empty")]
    EmptyPath,

    #[error("Required field missing: {field}")]
    MissingRequiredField { field: &'static str },

    // ========================================================================
    // Template / Expression Errors
    // ========================================================================
    #[error("Unresolved template reference '{{{{ {reference} }}}}'")]
    UnresolvedTemplate { reference: String },

    #[error("Cannot evaluate condition '{expression}': {reason}")]
    InvalidCondition { expression: String, reason: String },

    #[error("Invalid forEach target '{expression}': {reason}")]
    InvalidForEach { expression: String, reason: String },
}

impl DomainError {
    /// Stable error code, shared with reports and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidVersion { .. } | Self::InvalidVersionRange { .. } => "INVALID_VERSION",
            Self::InvalidCapability(_) => "INVALID_CAPABILITY",
            Self::InvalidModuleId(_) => "INVALID_MODULE_ID",
            Self::InvalidBlueprint(_) | Self::MissingRequiredField { .. } => "INVALID_BLUEPRINT",
            Self::AbsolutePathNotAllowed { .. } | Self::PathEscapesRoot { .. } | Self::EmptyPath => {
                "INVALID_PATH"
            }
            Self::UnresolvedTemplate { .. } => "UNRESOLVED_TEMPLATE",
            Self::InvalidCondition { .. } => "CONDITION_EVALUATION",
            Self::InvalidForEach { .. } => "INVALID_FOR_EACH",
        }
    }

    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidVersion { .. } | Self::InvalidVersionRange { .. } => vec![
                "Versions look like 1, 1.2 or 1.2.3".into(),
                "Ranges accept ^, ~, >=, <, x wildcards and || alternatives".into(),
            ],
            Self::InvalidCapability(raw) => vec![
                format!("Capability '{}' could not be parsed", raw),
                "Use the form name or name@version, e.g. database@1.0".into(),
            ],
            Self::AbsolutePathNotAllowed { .. } | Self::PathEscapesRoot { .. } => vec![
                "Blueprint paths are relative to the project root".into(),
                "Remove leading '/' and any '..' segments".into(),
            ],
            Self::UnresolvedTemplate { reference } => vec![
                format!("'{}' is not defined in the template context", reference),
                "Available roots: project, module, paths, item, index".into(),
            ],
            Self::InvalidForEach { .. } => {
                vec!["forEach must reference an array in the template context".into()]
            }
            _ => vec!["See documentation for more details".into()],
        }
    }

    /// Error category for CLI display styling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnresolvedTemplate { .. } => ErrorCategory::NotFound,
            _ => ErrorCategory::Validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Compatibility,
    NotFound,
    Internal,
}
