//! Conflict resolution for `CREATE_FILE` hitting a file that already exists.
//!
//! | Strategy  | Result                                   |
//! |-----------|------------------------------------------|
//! | (none)    | `FILE_ALREADY_EXISTS`                    |
//! | `error`   | `FILE_CONFLICT`                          |
//! | `skip`    | keep existing content, one warning       |
//! | `replace` | incoming content wins                    |
//! | `merge`   | `json`, `css`, `js` or `append` combine  |
//!
//! When `merge` names no strategy it is picked from the file extension.

use tracing::debug;

use crate::{
    application::{
        ApplicationError,
        modifiers::{
            json_merge::{merge_values, parse_jsonc, print_document},
            source::normalize,
        },
    },
    domain::{ArrayMergePolicy, ConflictResolution, ConflictStrategy, MergeStrategy, RelativePath},
    error::KilnResult,
};

/// What to do with the file after resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Stage this content.
    Write(String),
    /// Leave the existing content and report a warning.
    Keep { warning: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        path: &RelativePath,
        existing: &str,
        incoming: &str,
        policy: Option<ConflictResolution>,
    ) -> KilnResult<Resolution> {
        let Some(policy) = policy else {
            return Err(ApplicationError::FileAlreadyExists {
                path: path.to_string(),
            }
            .into());
        };

        debug!(path = %path, strategy = ?policy.strategy, "Resolving conflict");
        match policy.strategy {
            ConflictStrategy::Error => Err(ApplicationError::FileConflict {
                path: path.to_string(),
            }
            .into()),
            ConflictStrategy::Skip => Ok(Resolution::Keep {
                warning: format!("Skipped {path}: file already exists"),
            }),
            ConflictStrategy::Replace => Ok(Resolution::Write(incoming.to_string())),
            ConflictStrategy::Merge => {
                let strategy = policy
                    .merge_strategy
                    .unwrap_or_else(|| Self::strategy_for(path));
                Self::merge(path, existing, incoming, strategy).map(Resolution::Write)
            }
        }
    }

    /// Merge strategy implied by a file's extension.
    pub fn strategy_for(path: &RelativePath) -> MergeStrategy {
        match path.extension().as_deref() {
            Some("json" | "jsonc") => MergeStrategy::Json,
            Some("css" | "scss" | "pcss") => MergeStrategy::Css,
            Some("ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "mts" | "cts") => MergeStrategy::Js,
            _ => MergeStrategy::Append,
        }
    }

    fn merge(
        path: &RelativePath,
        existing: &str,
        incoming: &str,
        strategy: MergeStrategy,
    ) -> KilnResult<String> {
        let failed = |reason: String| ApplicationError::ModifierFailed {
            modifier: format!("{strategy:?} merge").to_lowercase(),
            path: path.to_string(),
            reason,
        };

        match strategy {
            MergeStrategy::Json => {
                let mut merged = parse_jsonc(existing).map_err(|e| failed(e.0))?;
                let incoming = parse_jsonc(incoming).map_err(|e| failed(e.0))?;
                merge_values(&mut merged, &incoming, true, ArrayMergePolicy::Concat);
                Ok(print_document(&merged).map_err(|e| failed(e.0))?)
            }
            MergeStrategy::Css => Ok(merge_css(existing, incoming)),
            MergeStrategy::Js => Ok(crate::application::modifiers::merge_modules(
                existing, incoming,
            )),
            MergeStrategy::Append => Ok(format!("{existing}{incoming}")),
        }
    }
}

/// Top-level CSS chunks: rule blocks, at-rules and `@import ...;` lines.
fn css_blocks(css: &str) -> Vec<&str> {
    let bytes = css.as_bytes();
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = css[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                continue;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    blocks.push(css[start..=i].trim());
                    start = i + 1;
                }
            }
            b';' if depth == 0 => {
                blocks.push(css[start..=i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    let rest = css[start.min(css.len())..].trim();
    if !rest.is_empty() {
        blocks.push(rest);
    }
    blocks.retain(|b| !b.is_empty());
    blocks
}

/// Append incoming blocks that are not already present.
pub fn merge_css(existing: &str, incoming: &str) -> String {
    let present: Vec<String> = css_blocks(existing).into_iter().map(normalize).collect();
    let mut out = existing.to_string();
    for block in css_blocks(incoming) {
        if present.contains(&normalize(block)) {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(block);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> RelativePath {
        RelativePath::try_new(path).unwrap()
    }

    fn resolve(path: &str, existing: &str, incoming: &str, policy: Option<ConflictResolution>) -> KilnResult<Resolution> {
        ConflictResolver::new().resolve(&p(path), existing, incoming, policy)
    }

    #[test]
    fn no_policy_means_already_exists() {
        let err = resolve("a.txt", "x", "y", None).unwrap_err();
        assert_eq!(err.code(), "FILE_ALREADY_EXISTS");
    }

    #[test]
    fn error_policy_is_a_conflict() {
        let err = resolve("a.txt", "x", "y", Some(ConflictResolution::new(ConflictStrategy::Error)))
            .unwrap_err();
        assert_eq!(err.code(), "FILE_CONFLICT");
    }

    #[test]
    fn skip_keeps_existing_with_warning() {
        let out = resolve("a.txt", "x", "y", Some(ConflictResolution::new(ConflictStrategy::Skip)))
            .unwrap();
        assert!(matches!(out, Resolution::Keep { warning } if warning.contains("a.txt")));
    }

    #[test]
    fn replace_takes_incoming() {
        let out = resolve("a.txt", "x", "y", Some(ConflictResolution::new(ConflictStrategy::Replace)))
            .unwrap();
        assert_eq!(out, Resolution::Write("y".into()));
    }

    #[test]
    fn json_merge_combines_objects_and_arrays() {
        let out = resolve(
            "components.json",
            r#"{"a": 1, "list": [1]}"#,
            r#"{"b": 2, "list": [2]}"#,
            Some(ConflictResolution::merge(MergeStrategy::Json)),
        )
        .unwrap();
        assert_eq!(
            out,
            Resolution::Write("{\n  \"a\": 1,\n  \"list\": [\n    1,\n    2\n  ],\n  \"b\": 2\n}\n".into())
        );
    }

    #[test]
    fn invalid_json_merge_fails() {
        let err = resolve(
            "a.json",
            "{",
            "{}",
            Some(ConflictResolution::merge(MergeStrategy::Json)),
        )
        .unwrap_err();
        assert_eq!(err.code(), "MODIFIER_FAILED");
    }

    #[test]
    fn css_merge_drops_exact_duplicates() {
        let existing = "@tailwind base;\n\nbody {\n  margin: 0;\n}\n";
        let incoming = "@tailwind base;\nbody { margin: 0; }\n.btn { color: red; }\n";
        let out = merge_css(existing, incoming);
        assert_eq!(out, "@tailwind base;\n\nbody {\n  margin: 0;\n}\n\n.btn { color: red; }\n");
    }

    #[test]
    fn merge_strategy_inferred_from_extension() {
        assert_eq!(ConflictResolver::strategy_for(&p("a/b.tsx")), MergeStrategy::Js);
        assert_eq!(ConflictResolver::strategy_for(&p("globals.css")), MergeStrategy::Css);
        assert_eq!(ConflictResolver::strategy_for(&p("README.md")), MergeStrategy::Append);

        let out = resolve(
            "notes.md",
            "a\n",
            "b\n",
            Some(ConflictResolution {
                strategy: ConflictStrategy::Merge,
                merge_strategy: None,
            }),
        )
        .unwrap();
        assert_eq!(out, Resolution::Write("a\nb\n".into()));
    }
}
