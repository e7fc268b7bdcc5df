//! Structural file modifiers and the registry that dispatches to them.
//!
//! A modifier is a named, stateless editor for one family of files. It
//! declares which parameters it accepts, validates them up front, and then
//! transforms the current content into new content without any I/O. The
//! registry owns the I/O: it reads through the VFS, runs the transform and
//! stages the result.
//!
//! ```text
//!   execute(name, path, params)
//!       │
//!       ├─ lookup ─────────────► MODIFIER_NOT_FOUND
//!       ├─ validate_params ────► PARAMETER_VALIDATION (every bad field)
//!       ├─ file type check ────► UNSUPPORTED_FILE_TYPE
//!       ├─ read via VFS ───────► FILE_NOT_FOUND / skip / create
//!       ├─ transform ──────────► MODIFIER_FAILED
//!       └─ put_file (only when the content changed)
//! ```

mod config_wrapper;
mod env_merger;
mod export_wrapper;
pub mod json_merge;
mod module_enhancer;
mod schema_extender;
pub mod source;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    application::{ApplicationError, services::vfs::VirtualFileSystem},
    domain::{ImportSpec, MissingFilePolicy, RelativePath, TemplateContext},
    error::KilnResult,
};

pub use config_wrapper::{JsConfigMerger, JsConfigWrapper};
pub use env_merger::DotenvMerger;
pub use export_wrapper::JsExportWrapper;
pub use json_merge::{JsonMerge, PackageJsonMerger, TsconfigEnhancer};
pub use module_enhancer::{TsModuleEnhancer, merge_modules};
pub use schema_extender::SchemaExtender;

/// File types shared by the JS/TS modifiers.
pub(crate) const SCRIPT_TYPES: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];

// ============================================================================
// Parameter schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Boolean,
    Object,
    Array,
    /// Any JSON value.
    Any,
}

impl ParamType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One accepted parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// A deeper check for one parameter: enum values, item shapes, and the like.
///
/// Runs after the top-level type check and only for fields that passed it.
#[derive(Debug, Clone, Copy)]
pub struct ParamShape {
    pub name: &'static str,
    pub check: fn(&Value) -> Result<(), String>,
}

impl ParamShape {
    pub const fn new(name: &'static str, check: fn(&Value) -> Result<(), String>) -> Self {
        Self { name, check }
    }

    /// The field must deserialize as `T`.
    pub const fn decodes<T: DeserializeOwned>(name: &'static str) -> Self {
        Self::new(name, decode_check::<T>)
    }
}

/// Decode `value` as `T`, keeping only the error message.
pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, String> {
    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
}

fn decode_check<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    decode::<T>(value).map(drop)
}

/// Run `shapes` over `params`, adding one message per failing field.
pub fn check_shapes(shapes: &[ParamShape], params: &Map<String, Value>, problems: &mut Vec<String>) {
    for shape in shapes {
        let prefix = format!("{}:", shape.name);
        if problems.iter().any(|p| p.starts_with(&prefix)) {
            continue;
        }
        match params.get(shape.name) {
            None | Some(Value::Null) => {}
            Some(value) => {
                if let Err(reason) = (shape.check)(value) {
                    problems.push(format!("{} {reason}", prefix));
                }
            }
        }
    }
}

pub(crate) fn import_shape(value: &Value) -> Result<(), String> {
    has_source(&decode::<ImportSpec>(value)?)
}

pub(crate) fn import_list_shape(value: &Value) -> Result<(), String> {
    decode::<Vec<ImportSpec>>(value)?.iter().try_for_each(has_source)
}

fn has_source(spec: &ImportSpec) -> Result<(), String> {
    if spec.from.trim().is_empty() {
        Err("import without a source".to_owned())
    } else {
        Ok(())
    }
}

pub(crate) fn non_blank(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if s.trim().is_empty() => Err("must not be empty".to_owned()),
        _ => Ok(()),
    }
}

/// Check `params` against `schema`, returning one message per bad field.
pub fn check_params(schema: &[ParamSpec], params: &Map<String, Value>) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    for spec in schema {
        match params.get(spec.name) {
            None | Some(Value::Null) if spec.required => {
                problems.push(format!("{}: required", spec.name));
            }
            Some(value) if !value.is_null() && !spec.kind.accepts(value) => {
                problems.push(format!(
                    "{}: expected {}, found {}",
                    spec.name,
                    spec.kind,
                    json_type_name(value)
                ));
            }
            _ => {}
        }
    }
    for key in params.keys() {
        if !schema.iter().any(|s| s.name == key) {
            problems.push(format!("{key}: unknown parameter"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

// ============================================================================
// Modifier trait
// ============================================================================

/// A transform failure, reported by the registry as `MODIFIER_FAILED`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Everything a transform may look at. Transforms never touch the VFS.
#[derive(Debug, Clone, Copy)]
pub struct ModifierInput<'a> {
    pub path: &'a RelativePath,
    /// Current content; empty when the file is being created.
    pub current: &'a str,
    pub params: &'a Map<String, Value>,
    pub context: &'a TemplateContext,
}

pub trait Modifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Extensions (`json`, `ts`) or exact file names (`package.json`).
    fn supported_file_types(&self) -> &'static [&'static str];

    fn params_schema(&self) -> &'static [ParamSpec];

    /// Checks beyond the top-level type of each field.
    fn param_shapes(&self) -> &'static [ParamShape] {
        &[]
    }

    /// Validate parameters, naming every offending field.
    fn validate_params(&self, params: &Map<String, Value>) -> Result<(), Vec<String>> {
        let mut problems = check_params(self.params_schema(), params).err().unwrap_or_default();
        check_shapes(self.param_shapes(), params, &mut problems);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    fn supports(&self, path: &RelativePath) -> bool {
        let file_name = path.file_name();
        let extension = path.extension();
        self.supported_file_types()
            .iter()
            .any(|t| *t == file_name || Some(*t) == extension.as_deref())
    }

    /// Produce the new content. Must be idempotent: applying the same
    /// parameters to its own output returns that output unchanged.
    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError>;
}

// ============================================================================
// Registry
// ============================================================================

/// What `execute` did to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierOutcome {
    Changed,
    /// The modifier's edit was already applied.
    Unchanged,
    /// The file was missing and the fallback was `skip`.
    Skipped,
}

/// Summary row for `kiln modifiers`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifierInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub supported_file_types: &'static [&'static str],
    pub params: &'static [ParamSpec],
}

#[derive(Clone, Default)]
pub struct ModifierRegistry {
    modifiers: BTreeMap<&'static str, Arc<dyn Modifier>>,
}

impl fmt::Debug for ModifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierRegistry")
            .field("modifiers", &self.names())
            .finish()
    }
}

impl ModifierRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in modifier.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(JsonMerge)
            .register(PackageJsonMerger)
            .register(TsconfigEnhancer)
            .register(DotenvMerger)
            .register(TsModuleEnhancer)
            .register(JsExportWrapper)
            .register(JsConfigWrapper)
            .register(JsConfigMerger)
            .register(SchemaExtender);
        registry
    }

    /// Add a modifier, replacing any registered under the same name.
    pub fn register(&mut self, modifier: impl Modifier + 'static) -> &mut Self {
        let name = modifier.name();
        if self.modifiers.insert(name, Arc::new(modifier)).is_some() {
            warn!(modifier = name, "Replaced a registered modifier");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Modifier> {
        self.modifiers.get(name).map(|m| m.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modifiers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    pub fn describe(&self) -> Vec<ModifierInfo> {
        self.modifiers
            .values()
            .map(|m| ModifierInfo {
                name: m.name(),
                description: m.description(),
                supported_file_types: m.supported_file_types(),
                params: m.params_schema(),
            })
            .collect()
    }

    /// Run a modifier against a file in the VFS. A missing file fails with
    /// `FILE_NOT_FOUND`; use [`Self::execute_with_fallback`] to choose otherwise.
    pub fn execute(
        &self,
        name: &str,
        path: &RelativePath,
        params: &Map<String, Value>,
        context: &TemplateContext,
        vfs: &mut VirtualFileSystem,
    ) -> KilnResult<ModifierOutcome> {
        self.execute_with_fallback(name, path, params, context, vfs, MissingFilePolicy::Error)
    }

    #[instrument(skip_all, fields(modifier = name, path = %path))]
    pub fn execute_with_fallback(
        &self,
        name: &str,
        path: &RelativePath,
        params: &Map<String, Value>,
        context: &TemplateContext,
        vfs: &mut VirtualFileSystem,
        fallback: MissingFilePolicy,
    ) -> KilnResult<ModifierOutcome> {
        let modifier = self
            .get(name)
            .ok_or_else(|| ApplicationError::ModifierNotFound {
                name: name.to_string(),
                available: self.names().iter().map(|n| n.to_string()).collect(),
            })?;

        modifier
            .validate_params(params)
            .map_err(|fields| ApplicationError::ParameterValidation {
                modifier: name.to_string(),
                fields,
            })?;

        if !modifier.supports(path) {
            return Err(ApplicationError::UnsupportedFileType {
                modifier: name.to_string(),
                path: path.to_string(),
                supported: modifier
                    .supported_file_types()
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            }
            .into());
        }

        let current = match vfs.read_optional(path)? {
            Some(content) => content,
            None => match fallback {
                MissingFilePolicy::Error => {
                    return Err(ApplicationError::FileNotFound {
                        path: path.to_string(),
                    }
                    .into());
                }
                MissingFilePolicy::Skip => {
                    debug!("Target missing, skipped");
                    return Ok(ModifierOutcome::Skipped);
                }
                MissingFilePolicy::Create => String::new(),
            },
        };

        let updated = modifier
            .transform(ModifierInput {
                path,
                current: &current,
                params,
                context,
            })
            .map_err(|e| ApplicationError::ModifierFailed {
                modifier: name.to_string(),
                path: path.to_string(),
                reason: e.0,
            })?;

        if updated == current && vfs.exists(path) {
            debug!("Already applied");
            return Ok(ModifierOutcome::Unchanged);
        }
        vfs.put_file(path, updated);
        debug!("Applied");
        Ok(ModifierOutcome::Changed)
    }
}

// ============================================================================
// Parameter helpers shared by the built-ins
// ============================================================================

pub(crate) fn param_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub(crate) fn param_bool(params: &Map<String, Value>, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn param_object<'a>(
    params: &'a Map<String, Value>,
    key: &str,
) -> Option<&'a Map<String, Value>> {
    params.get(key).and_then(Value::as_object)
}

/// Deserialize an optional parameter into a typed value.
pub(crate) fn param_as<T: serde::de::DeserializeOwned>(
    params: &Map<String, Value>,
    key: &str,
) -> Result<Option<T>, TransformError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode(value)
            .map(Some)
            .map_err(|e| TransformError::new(format!("{key}: {e}"))),
    }
}
