//! Template context and expression evaluation.
//!
//! Blueprint strings may reference the context with `{{ dotted.path }}`.
//! The context is a JSON document with these roots:
//!
//! | Root | Contents |
//! |------|----------|
//! | `project` | `name`, `nameSnake`, `nameKebab`, `namePascal`, `nameCamel`, `root` |
//! | `module` | `id`, `category`, `parameters.*` |
//! | `paths` | project path aliases (`paths.lib` → `src/lib`) |
//! | `item`, `index` | the current element while replaying a `forEach` |
//!
//! A reference that names a path but cannot be resolved is an error. Brace
//! groups that are not references (`style={{ color: 'red' }}` in JSX) are left
//! verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{DomainError, Module};

/// Roots whose references must always resolve.
const RESERVED_ROOTS: &[&str] = &["project", "module", "paths", "item", "index"];

/// Strings that read as `false` in conditions.
const FALSY_STRINGS: &[&str] = &["", "false", "0", "null", "undefined", "no", "off"];

// ============================================================================
// ProjectSettings
// ============================================================================

/// Project-wide values every module sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    /// Display form of the project root; files are always addressed relative to it.
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
}

impl ProjectSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, alias: impl Into<String>, path: impl Into<String>) -> Self {
        self.paths.insert(alias.into(), path.into());
        self
    }
}

// ============================================================================
// TemplateContext
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateContext {
    data: Map<String, Value>,
}

impl TemplateContext {
    /// Build the context a module's blueprint executes with.
    pub fn new(project: &ProjectSettings, module: &Module) -> Self {
        let mut data = Map::new();
        data.insert(
            "project".into(),
            json!({
                "name": project.name,
                "nameSnake": to_snake_case(&project.name),
                "nameKebab": to_kebab_case(&project.name),
                "namePascal": to_pascal_case(&project.name),
                "nameCamel": to_camel_case(&project.name),
                "root": project.root,
            }),
        );
        data.insert(
            "module".into(),
            json!({
                "id": module.id.as_str(),
                "category": module.category.to_string(),
                "parameters": Value::Object(module.parameters.clone()),
            }),
        );
        data.insert("paths".into(), json!(project.paths));
        Self { data }
    }

    /// A context over arbitrary data; mostly for tests and modifiers.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            _ => Self::empty(),
        }
    }

    pub fn empty() -> Self {
        Self { data: Map::new() }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Child context with the `forEach` bindings set.
    pub fn with_item(&self, item: Value, index: usize) -> Self {
        let mut data = self.data.clone();
        data.insert("item".into(), item);
        data.insert("index".into(), json!(index));
        Self { data }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Look up a dotted path (`module.parameters.tables.0`).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.data.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Substitute every `{{ reference }}` in `template`.
    pub fn render(&self, template: &str) -> Result<String, DomainError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };

            let inner = after[..end].trim();
            match self.reference_kind(inner) {
                Reference::Path => {
                    let value = self.lookup(inner).ok_or_else(|| {
                        DomainError::UnresolvedTemplate {
                            reference: inner.to_string(),
                        }
                    })?;
                    out.push_str(&stringify(value));
                }
                Reference::Literal => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Render every string inside a JSON value, keys included.
    pub fn render_value(&self, value: &Value) -> Result<Value, DomainError> {
        Ok(match value {
            Value::String(s) => Value::String(self.render(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.render_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut rendered = Map::with_capacity(map.len());
                for (key, v) in map {
                    rendered.insert(self.render(key)?, self.render_value(v)?);
                }
                Value::Object(rendered)
            }
            other => other.clone(),
        })
    }

    fn reference_kind(&self, inner: &str) -> Reference {
        if !is_path_expression(inner) {
            return Reference::Literal;
        }
        let root = inner.split('.').next().unwrap_or_default();
        if inner.contains('.') || RESERVED_ROOTS.contains(&root) || self.data.contains_key(root) {
            Reference::Path
        } else {
            // A bare unknown identifier is most likely JSX shorthand.
            Reference::Literal
        }
    }

    // ------------------------------------------------------------------------
    // Conditions & iteration
    // ------------------------------------------------------------------------

    /// Evaluate an action `condition`.
    ///
    /// Accepted forms: `{{ ref }}` templates (rendered, then coerced),
    /// bare paths (`module.parameters.enabled`), `!` negation of either,
    /// `true`/`false`, and `lhs == rhs` / `lhs != rhs` where `rhs` is a
    /// quoted string, number or boolean.
    pub fn evaluate_condition(&self, expression: &str) -> Result<bool, DomainError> {
        let invalid = |reason: String| DomainError::InvalidCondition {
            expression: expression.to_string(),
            reason,
        };

        let trimmed = expression.trim();
        for op in ["==", "!="] {
            if let Some((lhs, rhs)) = trimmed.split_once(op) {
                let left = self.operand(lhs.trim()).map_err(|e| invalid(e.to_string()))?;
                let right = self.operand(rhs.trim()).map_err(|e| invalid(e.to_string()))?;
                let equal = loosely_equal(&left, &right);
                return Ok(if op == "==" { equal } else { !equal });
            }
        }

        let mut negate = false;
        let mut body = trimmed;
        while let Some(stripped) = body.strip_prefix('!') {
            negate = !negate;
            body = stripped.trim_start();
        }

        let value = self.operand(body).map_err(|e| invalid(e.to_string()))?;
        Ok(truthy(&value) != negate)
    }

    /// Resolve a `forEach` target to its elements.
    pub fn resolve_array(&self, expression: &str) -> Result<Vec<Value>, DomainError> {
        let path = strip_braces(expression.trim());
        match self.lookup(path) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(other) => Err(DomainError::InvalidForEach {
                expression: expression.to_string(),
                reason: format!("expected an array, found {}", type_name(other)),
            }),
            None => Err(DomainError::InvalidForEach {
                expression: expression.to_string(),
                reason: "not defined in the template context".into(),
            }),
        }
    }

    fn operand(&self, text: &str) -> Result<Value, DomainError> {
        if text.contains("{{") {
            return Ok(Value::String(self.render(text)?));
        }
        if let Some(quoted) = text
            .strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .or_else(|| text.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
        {
            return Ok(Value::String(quoted.to_string()));
        }
        match text {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "null" => return Ok(Value::Null),
            _ => {}
        }
        if let Ok(n) = text.parse::<f64>() {
            return Ok(json!(n));
        }
        if !is_path_expression(text) {
            return Err(DomainError::InvalidCondition {
                expression: text.to_string(),
                reason: "not a reference or literal".into(),
            });
        }
        self.lookup(text)
            .cloned()
            .ok_or_else(|| DomainError::UnresolvedTemplate {
                reference: text.to_string(),
            })
    }
}

enum Reference {
    Path,
    Literal,
}

fn strip_braces(text: &str) -> &str {
    text.strip_prefix("{{")
        .and_then(|t| t.strip_suffix("}}"))
        .map_or(text, str::trim)
}

fn is_path_expression(text: &str) -> bool {
    let mut segments = text.split('.');
    let Some(root) = segments.next() else {
        return false;
    };
    let ident = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '$')
    };
    ident(root)
        && root
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && segments.all(ident)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// JavaScript-flavoured truthiness, plus the usual "off" spellings.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !FALSY_STRINGS.contains(&s.trim().to_ascii_lowercase().as_str()),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) if a == b => true,
        (a, b) => stringify(a) == stringify(b),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// String Case Conversion Helpers
// ============================================================================

/// `"My Awesome App"` → `"my_awesome_app"`.
pub fn to_snake_case(s: &str) -> String {
    split_words(s).join("_")
}

/// `"My Awesome App"` → `"my-awesome-app"`.
pub fn to_kebab_case(s: &str) -> String {
    split_words(s).join("-")
}

/// `"my-app"` → `"MyApp"`, `"HTTPRequest"` → `"HttpRequest"`.
pub fn to_pascal_case(s: &str) -> String {
    split_words(s).iter().map(|w| capitalize(w)).collect()
}

/// `"my-app"` → `"myApp"`.
pub fn to_camel_case(s: &str) -> String {
    let words = split_words(s);
    let mut out = String::new();
    for (index, word) in words.iter().enumerate() {
        if index == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split on separators, camelCase transitions and acronym boundaries.
///
/// `XMLHttpRequest` → `["xml", "http", "request"]`.
fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(current.to_lowercase());
                current.clear();
            }
            continue;
        }

        if let Some(&next) = chars.peek() {
            // "myApp" → "my" + "App"
            if c.is_lowercase() && next.is_uppercase() {
                current.push(c);
                words.push(current.to_lowercase());
                current.clear();
                continue;
            }

            // "HTTPServer" → "HTTP" + "Server"
            if c.is_uppercase()
                && next.is_uppercase()
                && chars.clone().nth(1).is_some_and(|n| n.is_lowercase())
            {
                current.push(c);
                words.push(current.to_lowercase());
                current.clear();
                continue;
            }
        }

        current.push(c);
    }

    if !current.is_empty() {
        words.push(current.to_lowercase());
    }
    words
}
