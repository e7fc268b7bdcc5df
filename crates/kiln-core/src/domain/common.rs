use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::DomainError;

/// A project path guaranteed to be **relative** and to stay inside the root.
///
/// Blueprints name files like `src/app/layout.tsx`; they must never reach an
/// absolute location or climb out of the project with `..`. The path is kept
/// normalized with `/` separators so staged entries compare equal regardless
/// of how the author spelled them (`./src//a.ts` == `src/a.ts`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Validate and normalize a path.
    pub fn try_new(path: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = path.as_ref().trim();
        if raw.is_empty() {
            return Err(DomainError::EmptyPath);
        }
        if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
            return Err(DomainError::AbsolutePathNotAllowed {
                path: raw.to_string(),
            });
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(DomainError::PathEscapesRoot {
                            path: raw.to_string(),
                        });
                    }
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(DomainError::EmptyPath);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Lowercased extension, if any (`tsx`, `json`, `env` for `.env.local`).
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        if let Some(rest) = name.strip_prefix(".env") {
            if rest.is_empty() || rest.starts_with('.') {
                return Some("env".into());
            }
        }
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

impl AsRef<Path> for RelativePath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_and_dots() {
        let p = RelativePath::try_new("./src//app/../lib/db.ts").unwrap();
        assert_eq!(p.as_str(), "src/lib/db.ts");
        assert_eq!(p.file_name(), "db.ts");
        assert_eq!(p.extension().as_deref(), Some("ts"));
    }

    #[test]
    fn rejects_absolute_and_escaping_paths() {
        assert!(matches!(
            RelativePath::try_new("/etc/passwd"),
            Err(DomainError::AbsolutePathNotAllowed { .. })
        ));
        assert!(matches!(
            RelativePath::try_new("../outside.txt"),
            Err(DomainError::PathEscapesRoot { .. })
        ));
        assert!(matches!(RelativePath::try_new("./"), Err(DomainError::EmptyPath)));
    }

    #[test]
    fn dotenv_files_have_env_extension() {
        assert_eq!(
            RelativePath::try_new(".env").unwrap().extension().as_deref(),
            Some("env")
        );
        assert_eq!(
            RelativePath::try_new(".env.local").unwrap().extension().as_deref(),
            Some("env")
        );
        assert_eq!(RelativePath::try_new("Makefile").unwrap().extension(), None);
        assert_eq!(RelativePath::try_new(".gitignore").unwrap().extension(), None);
    }
}
