//! Error handling for the Kiln CLI.
//!
//! Provides structured errors with:
//! - User-friendly messages
//! - Actionable suggestions
//! - Proper error chaining
//! - Exit code mapping

use std::error::Error as _;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use thiserror::Error;

use kiln_adapters::CatalogError;
use kiln_core::error::{ErrorCategory as CoreCategory, KilnError};

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input that clap could not catch.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The genome file does not exist.
    #[error("Genome file not found: {}", path.display())]
    GenomeNotFound { path: PathBuf },

    // ── Config errors ──────────────────────────────────────────────────────
    /// A configuration file could not be read, parsed, or written.
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ── Engine errors ──────────────────────────────────────────────────────
    /// An error propagated from `kiln-core`.
    #[error("{0}")]
    Core(#[from] KilnError),

    /// The module catalog or genome could not be loaded.
    #[error("{0}")]
    Catalog(#[from] CatalogError),

    /// The run finished but some modules failed.
    #[error("{} of {total} module(s) failed: {}", failed.len(), failed.join(", "))]
    PartialFailure { failed: Vec<String>, total: usize },

    // ── System errors ──────────────────────────────────────────────────────
    /// An I/O operation failed.
    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation cancelled by user.
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::IoError {
            message: err.to_string(),
            source: err,
        }
    }
}

impl CliError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidInput { .. } => vec!["Use --help for usage information".into()],

            Self::GenomeNotFound { path } => vec![
                format!("Check that '{}' exists", path.display()),
                "A genome needs a [project] table and one [[modules]] entry per module".into(),
            ],

            Self::ConfigError { .. } => vec![
                "Check the file printed by 'kiln config path'".into(),
                "Use 'kiln init --force' to write a fresh default config".into(),
            ],

            Self::Core(core) => core.suggestions(),

            Self::Catalog(CatalogError::UnknownModule { available, .. }) => vec![
                format!("Available modules: {}", available.join(", ")),
                "Point --modules at the directory holding the module".into(),
            ],
            Self::Catalog(CatalogError::Domain(e)) => e.suggestions(),
            Self::Catalog(_) => vec![
                "Check the module.toml files in the catalog directory".into(),
                "Run with -v to see which modules were skipped".into(),
            ],

            Self::PartialFailure { .. } => vec![
                "Modules that succeeded were written; failed modules left no changes".into(),
                "Fix the errors above and re-run 'kiln apply'; merging actions are idempotent"
                    .into(),
            ],

            Self::IoError { .. } => vec![
                "Check file permissions".into(),
                "Ensure the parent directory exists".into(),
            ],

            Self::Cancelled => vec!["No changes were made".into()],
        }
    }

    /// Get the error category for styling and exit codes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. } | Self::Cancelled => ErrorCategory::UserError,
            Self::GenomeNotFound { .. } => ErrorCategory::NotFound,
            Self::ConfigError { .. } => ErrorCategory::Configuration,
            Self::Core(core) => match core.category() {
                CoreCategory::Validation
                | CoreCategory::Compatibility
                | CoreCategory::Conflict
                | CoreCategory::Cancelled => ErrorCategory::UserError,
                CoreCategory::NotFound => ErrorCategory::NotFound,
                CoreCategory::Configuration => ErrorCategory::Configuration,
                CoreCategory::Execution | CoreCategory::Internal => ErrorCategory::Internal,
            },
            Self::Catalog(catalog) => match catalog {
                CatalogError::NotFound { .. } => ErrorCategory::NotFound,
                CatalogError::UnknownModule { .. } | CatalogError::Domain(_) => {
                    ErrorCategory::UserError
                }
                CatalogError::Io { .. } => ErrorCategory::Internal,
                CatalogError::Parse { .. }
                | CatalogError::Invalid { .. }
                | CatalogError::DuplicateModule { .. } => ErrorCategory::Configuration,
            },
            Self::PartialFailure { .. } => ErrorCategory::Partial,
            Self::IoError { .. } => ErrorCategory::Internal,
        }
    }

    /// Exit code to pass to the OS.
    ///
    /// | Category        | Code |
    /// |-----------------|------|
    /// | Internal        |  1   |
    /// | User error      |  2   |
    /// | Not found       |  3   |
    /// | Configuration   |  4   |
    /// | Partial failure |  5   |
    pub fn exit_code(&self) -> u8 {
        match self.category() {
            ErrorCategory::Internal => 1,
            ErrorCategory::UserError => 2,
            ErrorCategory::NotFound => 3,
            ErrorCategory::Configuration => 4,
            ErrorCategory::Partial => 5,
        }
    }

    /// Extra detail lines: one per resolution issue.
    fn details(&self) -> Vec<String> {
        match self {
            Self::Core(KilnError::Resolution { issues }) => {
                issues.iter().map(ToString::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Format the error for display with colors and suggestions.
    pub fn format_colored(&self, verbose: bool) -> String {
        let mut output = format!("\n{} {}\n\n", "✗".red().bold(), "Error:".red().bold());
        output.push_str(&format!("  {}\n", self.to_string().red()));

        for line in self.details() {
            output.push_str(&format!("    {} {}\n", "•".red(), line));
        }

        if verbose {
            let mut source = self.source();
            while let Some(err) = source {
                output.push_str(&format!("\n  {} {}\n", "→".dimmed(), err.to_string().dimmed()));
                source = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str(&format!("\n{}\n", "Suggestions:".yellow().bold()));
            for suggestion in suggestions {
                output.push_str(&format!("  {suggestion}\n"));
            }
        }

        if !verbose {
            output.push('\n');
            output.push_str(&format!(
                "{} {}\n",
                "\u{2139}".blue(), // ℹ
                "Use -v / --verbose for more details.".dimmed(),
            ));
        }

        output
    }

    /// Plain-text version of [`Self::format_colored`] with no ANSI codes.
    pub fn format_plain(&self, verbose: bool) -> String {
        let mut out = format!("\nError: {self}\n");

        for line in self.details() {
            out.push_str(&format!("    - {line}\n"));
        }

        if verbose {
            let mut src = self.source();
            while let Some(err) = src {
                out.push_str(&format!("  Caused by: {err}\n"));
                src = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\nSuggestions:\n");
            for s in &suggestions {
                out.push_str(&format!("  {s}\n"));
            }
        }

        if !verbose {
            out.push_str("\nUse -v / --verbose for more details.\n");
        }

        out
    }

    /// Log the error using tracing.
    pub fn log(&self) {
        match self.category() {
            ErrorCategory::UserError => tracing::warn!("User error: {}", self),
            ErrorCategory::NotFound => tracing::warn!("Not found: {}", self),
            ErrorCategory::Partial => tracing::warn!("Partial failure: {}", self),
            ErrorCategory::Configuration => tracing::error!("Configuration error: {}", self),
            ErrorCategory::Internal => tracing::error!("Internal error: {}", self),
        }

        if let Some(source) = self.source() {
            tracing::debug!("Caused by: {}", source);
        }
    }
}

/// Error categories for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User input error (validation, unresolvable genome).
    UserError,
    /// Resource not found.
    NotFound,
    /// Configuration error.
    Configuration,
    /// Some modules failed, others were applied.
    Partial,
    /// Internal/system error.
    Internal,
}

// ── IntoCli trait ─────────────────────────────────────────────────────────────

/// Extension trait to convert `io::Error` results into [`CliError`] at
/// call-sites with a descriptive context message.
pub trait IntoCli<T> {
    /// Convert to `CliResult` attaching a human-readable context message.
    fn with_cli_context<F, S>(self, f: F) -> CliResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IntoCli<T> for Result<T, std::io::Error> {
    fn with_cli_context<F, S>(self, f: F) -> CliResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| CliError::IoError {
            message: f().into(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use kiln_core::application::ApplicationError;
    use kiln_core::domain::{IssueCode, ResolutionIssue, Severity};

    fn resolution_error() -> CliError {
        CliError::Core(KilnError::Resolution {
            issues: vec![ResolutionIssue {
                code: IssueCode::MissingCapability,
                severity: Severity::Error,
                message: "module 'auth' requires capability 'database'".into(),
                module: None,
                capability: Some("database".into()),
                modules: vec![],
                suggestions: vec!["Add a module that provides 'database'".into()],
            }],
        })
    }

    #[test]
    fn exit_codes_by_category() {
        assert_eq!(CliError::Cancelled.exit_code(), 2);
        assert_eq!(resolution_error().exit_code(), 2);
        assert_eq!(
            CliError::GenomeNotFound {
                path: "kiln.toml".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            CliError::ConfigError {
                message: "x".into(),
                source: None
            }
            .exit_code(),
            4
        );
        assert_eq!(
            CliError::PartialFailure {
                failed: vec!["auth".into()],
                total: 3
            }
            .exit_code(),
            5
        );
        assert_eq!(
            CliError::IoError {
                message: "x".into(),
                source: io::Error::other("e"),
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn core_not_found_maps_to_three() {
        let err: CliError = KilnError::from(ApplicationError::BlueprintNotFound {
            module: "auth".into(),
        })
        .into();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn unknown_module_lists_catalog() {
        let err = CliError::Catalog(CatalogError::UnknownModule {
            id: "prisma".into(),
            available: vec!["drizzle".into(), "nextjs".into()],
        });
        assert_eq!(err.exit_code(), 2);
        assert!(err.suggestions().iter().any(|s| s.contains("drizzle, nextjs")));
    }

    #[test]
    fn plain_format_lists_resolution_issues() {
        let s = resolution_error().format_plain(false);
        assert!(s.contains("Error:"));
        assert!(s.contains("[MISSING_CAPABILITY] module 'auth' requires capability 'database'"));
        assert!(s.contains("--verbose"));
    }

    #[test]
    fn format_plain_verbose_omits_hint() {
        let s = CliError::Cancelled.format_plain(true);
        assert!(!s.contains("--verbose"));
    }

    #[test]
    fn partial_failure_message_names_modules() {
        let err = CliError::PartialFailure {
            failed: vec!["auth".into(), "sentry".into()],
            total: 4,
        };
        assert_eq!(err.to_string(), "2 of 4 module(s) failed: auth, sentry");
    }

    #[test]
    fn into_cli_io_error() {
        let result: Result<(), io::Error> = Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let cli: CliResult<()> = result.with_cli_context(|| "reading genome");
        assert!(matches!(cli, Err(CliError::IoError { .. })));
    }
}
