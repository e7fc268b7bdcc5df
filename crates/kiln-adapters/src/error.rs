//! Errors raised while loading catalogs and genomes from disk.

use std::path::PathBuf;

use thiserror::Error;

use kiln_core::{application::ApplicationError, domain::DomainError, error::KilnError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("Duplicate module '{id}' in {} and {}", first.display(), second.display())]
    DuplicateModule {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Module '{id}' is not in the catalog")]
    UnknownModule { id: String, available: Vec<String> },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CatalogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<CatalogError> for KilnError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::NotFound { path } => ApplicationError::FileNotFound {
                path: path.display().to_string(),
            }
            .into(),
            CatalogError::Domain(e) => KilnError::Domain(e),
            CatalogError::UnknownModule { ref available, .. } => KilnError::Configuration {
                message: format!("{error} (available: {})", available.join(", ")),
            },
            other => KilnError::Configuration {
                message: other.to_string(),
            },
        }
    }
}
