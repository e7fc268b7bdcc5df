//! `dotenv-merger`: upsert `KEY=value` lines in `.env` files.
//!
//! Line oriented on purpose: comments, blank lines and ordering of every
//! other line are kept exactly.

use super::{Modifier, ModifierInput, ParamSpec, ParamType, TransformError, param_bool, param_str};

pub struct DotenvMerger;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::required("key", ParamType::String, "Variable name"),
    ParamSpec::required("value", ParamType::String, "Variable value"),
    ParamSpec::optional("comment", ParamType::String, "Comment line written above a new key"),
    ParamSpec::optional("overwrite", ParamType::Boolean, "Replace an existing value (default false)"),
];

/// `KEY` of an assignment line (`KEY=…` or `export KEY=…`).
fn line_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, _) = line.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Quote values that would otherwise be cut at whitespace or `#`.
fn format_value(value: &str) -> String {
    let already_quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if already_quoted || !value.contains([' ', '#', '\t']) {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\\\""))
    }
}

impl Modifier for DotenvMerger {
    fn name(&self) -> &'static str {
        "dotenv-merger"
    }

    fn description(&self) -> &'static str {
        "Add or update a KEY=value line in a .env file"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        &["env"]
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let key = param_str(input.params, "key").unwrap_or_default();
        let value = param_str(input.params, "value").unwrap_or_default();
        let overwrite = param_bool(input.params, "overwrite", false);
        if !is_valid_key(key) {
            return Err(TransformError::new(format!("'{key}' is not a valid variable name")));
        }

        let line = format!("{key}={}", format_value(value));
        let mut lines: Vec<String> = input.current.lines().map(str::to_string).collect();

        if let Some(existing) = lines.iter_mut().find(|l| line_key(l) == Some(key)) {
            if overwrite && existing.trim() != line {
                let exported = existing.trim_start().starts_with("export ");
                *existing = if exported { format!("export {line}") } else { line };
                return Ok(lines.join("\n") + "\n");
            }
            return Ok(input.current.to_string());
        }

        if let Some(comment) = param_str(input.params, "comment") {
            if !lines.is_empty() && !lines.last().is_some_and(|l| l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(format!("# {}", comment.trim_start_matches('#').trim()));
        }
        lines.push(line);
        Ok(lines.join("\n") + "\n")
    }
}
