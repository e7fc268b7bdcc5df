//! Blueprints: ordered, declarative scripts of semantic file operations.
//!
//! The action vocabulary is a closed tagged union. Each variant carries only
//! the fields its kind needs, so a `CREATE_FILE` without a `path` fails at
//! load time instead of half-way through a run.
//!
//! ## Serialized form
//!
//! ```json
//! {
//!   "type": "CREATE_FILE",
//!   "path": "src/lib/db.ts",
//!   "content": "export const db = {{ module.parameters.client }};",
//!   "condition": "{{ module.parameters.enabled }}",
//!   "forEach": "module.parameters.tables",
//!   "conflict": { "strategy": "merge", "mergeStrategy": "js" }
//! }
//! ```

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DomainError;

// ============================================================================
// Blueprint
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<BlueprintAction>,
}

impl Blueprint {
    pub fn new(id: impl Into<String>, actions: Vec<BlueprintAction>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            actions,
        }
    }

    /// Structural checks that serde cannot express.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::MissingRequiredField { field: "id" });
        }
        for (index, action) in self.actions.iter().enumerate() {
            action.kind.validate().map_err(|reason| {
                DomainError::InvalidBlueprint(format!(
                    "{} action #{} ({}): {}",
                    self.id,
                    index + 1,
                    action.kind.name(),
                    reason
                ))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// Actions
// ============================================================================

/// One step of a blueprint: a kind plus the shared `condition`/`forEach`.
///
/// Deserialization rejects keys that neither the kind nor the shared fields
/// know, so a misspelt `conflict` or `condition` fails at load time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlueprintAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, rename = "forEach", skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl BlueprintAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            condition: None,
            for_each: None,
            kind,
        }
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn for_each(mut self, target: impl Into<String>) -> Self {
        self.for_each = Some(target.into());
        self
    }
}

impl<'de> Deserialize<'de> for BlueprintAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let condition = take_string(&mut fields, "condition")?;
        let for_each = take_string(&mut fields, "forEach")?;
        let kind = ActionKind::deserialize(Value::Object(fields)).map_err(de::Error::custom)?;
        Ok(Self {
            condition,
            for_each,
            kind,
        })
    }
}

fn take_string<E: de::Error>(
    fields: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<String>, E> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(E::custom(format!("`{key}` must be a string"))),
    }
}

impl From<ActionKind> for BlueprintAction {
    fn from(kind: ActionKind) -> Self {
        Self::new(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum ActionKind {
    InstallPackages {
        packages: Vec<String>,
        #[serde(default)]
        dev: bool,
    },
    AddScript {
        name: String,
        command: String,
    },
    AddEnvVar {
        key: String,
        value: String,
        #[serde(default = "default_env_path")]
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    CreateFile {
        path: String,
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conflict: Option<ConflictResolution>,
    },
    AppendToFile {
        path: String,
        content: String,
    },
    PrependToFile {
        path: String,
        content: String,
    },
    RunCommand {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        /// Escalate a failure from "this module failed" to "stop the run".
        #[serde(default)]
        abort_run: bool,
    },
    MergeJson {
        path: String,
        content: Value,
        #[serde(default = "default_true")]
        deep: bool,
        #[serde(default)]
        arrays: ArrayMergePolicy,
    },
    AddImport {
        path: String,
        imports: Vec<ImportSpec>,
    },
    EnhanceFile {
        path: String,
        modifier: String,
        #[serde(default)]
        params: Map<String, Value>,
        #[serde(default)]
        fallback: MissingFilePolicy,
    },
    MergeConfig {
        path: String,
        config: Map<String, Value>,
    },
    WrapConfig {
        path: String,
        wrapper: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        import: Option<ImportSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        env: Map<String, Value>,
    },
    ExtendSchema {
        path: String,
        definitions: Vec<SchemaDefinition>,
        #[serde(default)]
        imports: Vec<ImportSpec>,
    },
}

fn default_env_path() -> String {
    ".env".to_string()
}

fn default_true() -> bool {
    true
}

impl ActionKind {
    /// Wire name of the kind, as written in blueprints.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstallPackages { .. } => "INSTALL_PACKAGES",
            Self::AddScript { .. } => "ADD_SCRIPT",
            Self::AddEnvVar { .. } => "ADD_ENV_VAR",
            Self::CreateFile { .. } => "CREATE_FILE",
            Self::AppendToFile { .. } => "APPEND_TO_FILE",
            Self::PrependToFile { .. } => "PREPEND_TO_FILE",
            Self::RunCommand { .. } => "RUN_COMMAND",
            Self::MergeJson { .. } => "MERGE_JSON",
            Self::AddImport { .. } => "ADD_IMPORT",
            Self::EnhanceFile { .. } => "ENHANCE_FILE",
            Self::MergeConfig { .. } => "MERGE_CONFIG",
            Self::WrapConfig { .. } => "WRAP_CONFIG",
            Self::ExtendSchema { .. } => "EXTEND_SCHEMA",
        }
    }

    /// The file this action targets, if it targets one.
    pub fn target_path(&self) -> Option<&str> {
        match self {
            Self::InstallPackages { .. } | Self::AddScript { .. } => Some("package.json"),
            Self::RunCommand { .. } => None,
            Self::AddEnvVar { path, .. }
            | Self::CreateFile { path, .. }
            | Self::AppendToFile { path, .. }
            | Self::PrependToFile { path, .. }
            | Self::MergeJson { path, .. }
            | Self::AddImport { path, .. }
            | Self::EnhanceFile { path, .. }
            | Self::MergeConfig { path, .. }
            | Self::WrapConfig { path, .. }
            | Self::ExtendSchema { path, .. } => Some(path),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(path) = self.target_path() {
            if path.trim().is_empty() {
                return Err("path must not be empty".into());
            }
        }
        match self {
            Self::InstallPackages { packages, .. } if packages.is_empty() => {
                Err("packages must not be empty".into())
            }
            Self::AddScript { name, .. } if name.trim().is_empty() => {
                Err("script name must not be empty".into())
            }
            Self::AddEnvVar { key, .. } if key.trim().is_empty() => {
                Err("key must not be empty".into())
            }
            Self::RunCommand { command, .. } if command.trim().is_empty() => {
                Err("command must not be empty".into())
            }
            Self::MergeJson { content, .. } if !content.is_object() => {
                Err("content must be a JSON object".into())
            }
            Self::AddImport { imports, .. } if imports.is_empty() => {
                Err("imports must not be empty".into())
            }
            Self::EnhanceFile { modifier, .. } if modifier.trim().is_empty() => {
                Err("modifier must not be empty".into())
            }
            Self::WrapConfig { wrapper, .. } if wrapper.trim().is_empty() => {
                Err("wrapper must not be empty".into())
            }
            Self::ExtendSchema { definitions, .. } if definitions.is_empty() => {
                Err("definitions must not be empty".into())
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Supporting value types
// ============================================================================

/// What to do when a `CREATE_FILE` hits an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConflictResolution {
    pub strategy: ConflictStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<MergeStrategy>,
}

impl ConflictResolution {
    pub const fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            merge_strategy: None,
        }
    }

    pub const fn merge(with: MergeStrategy) -> Self {
        Self {
            strategy: ConflictStrategy::Merge,
            merge_strategy: Some(with),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    Error,
    Skip,
    Replace,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Json,
    Css,
    Js,
    Append,
}

/// How arrays combine during a JSON merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMergePolicy {
    #[default]
    Concat,
    Replace,
    Unique,
}

/// What `ENHANCE_FILE` does when its target does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFilePolicy {
    #[default]
    Error,
    Skip,
    Create,
}

/// One ES import declaration.
///
/// `{ from: "react", default: "React", named: ["useState"] }` prints as
/// `import React, { useState } from "react";`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImportSpec {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub named: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub type_only: bool,
}

impl ImportSpec {
    pub fn named(from: impl Into<String>, names: &[&str]) -> Self {
        Self {
            from: from.into(),
            named: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn default_import(from: impl Into<String>, binding: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            default: Some(binding.into()),
            ..Self::default()
        }
    }
}

/// A named definition appended by `EXTEND_SCHEMA`: `export const name = body;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    pub name: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_tagged_actions_with_shared_fields() {
        let action: BlueprintAction = serde_json::from_value(json!({
            "type": "CREATE_FILE",
            "path": "src/{{ item }}.ts",
            "content": "export {};",
            "forEach": "module.parameters.files",
            "condition": "{{ module.parameters.enabled }}",
            "conflict": { "strategy": "merge", "mergeStrategy": "js" }
        }))
        .unwrap();

        assert_eq!(action.for_each.as_deref(), Some("module.parameters.files"));
        assert!(action.condition.is_some());
        match action.kind {
            ActionKind::CreateFile { conflict, .. } => {
                assert_eq!(conflict, Some(ConflictResolution::merge(MergeStrategy::Js)));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_is_rejected_at_load() {
        let result: Result<BlueprintAction, _> =
            serde_json::from_value(json!({ "type": "CREATE_FILE", "content": "x" }));
        assert!(result.is_err());

        let unknown: Result<BlueprintAction, _> =
            serde_json::from_value(json!({ "type": "DELETE_EVERYTHING", "path": "x" }));
        assert!(unknown.is_err());
    }

    #[test]
    fn defaults_are_applied() {
        let action: BlueprintAction = serde_json::from_value(json!({
            "type": "ADD_ENV_VAR", "key": "DATABASE_URL", "value": "postgres://"
        }))
        .unwrap();
        assert_eq!(action.kind.target_path(), Some(".env"));

        let merge: BlueprintAction = serde_json::from_value(json!({
            "type": "MERGE_JSON", "path": "a.json", "content": {"a": 1}
        }))
        .unwrap();
        assert!(matches!(
            merge.kind,
            ActionKind::MergeJson { deep: true, arrays: ArrayMergePolicy::Concat, .. }
        ));
    }

    #[test]
    fn validate_reports_action_position() {
        let blueprint = Blueprint::new(
            "bp",
            vec![
                ActionKind::AddScript {
                    name: "dev".into(),
                    command: "next dev".into(),
                }
                .into(),
                ActionKind::InstallPackages {
                    packages: vec![],
                    dev: false,
                }
                .into(),
            ],
        );
        let err = blueprint.validate().unwrap_err().to_string();
        assert!(err.contains("#2"));
        assert!(err.contains("INSTALL_PACKAGES"));
    }

    #[test]
    fn serializes_with_type_tag() {
        let action = BlueprintAction::new(ActionKind::AppendToFile {
            path: "README.md".into(),
            content: "more".into(),
        });
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "APPEND_TO_FILE");
        assert!(value.get("forEach").is_none());
    }

    #[test]
    fn misspelt_keys_are_rejected() {
        let err = serde_json::from_value::<BlueprintAction>(json!({
            "type": "CREATE_FILE",
            "path": "a.txt",
            "content": "x",
            "conflcit": { "strategy": "skip" }
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("conflcit"), "{err}");

        let err = serde_json::from_value::<BlueprintAction>(json!({
            "type": "ADD_SCRIPT",
            "name": "dev",
            "command": "next dev",
            "conditon": "false"
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("conditon"), "{err}");

        let err = serde_json::from_value::<BlueprintAction>(json!({
            "type": "APPEND_TO_FILE",
            "path": "README.md",
            "content": "more",
            "foreach": "module.parameters.items"
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("foreach"), "{err}");
    }

    #[test]
    fn nested_values_reject_unknown_keys() {
        let err = serde_json::from_value::<BlueprintAction>(json!({
            "type": "CREATE_FILE",
            "path": "a.txt",
            "conflict": { "strategy": "merge", "mergeStrategey": "js" }
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("mergeStrategey"), "{err}");

        let err = serde_json::from_value::<BlueprintAction>(json!({
            "type": "ADD_IMPORT",
            "path": "src/app.ts",
            "imports": [{ "from": "react", "names": ["useState"] }]
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("names"), "{err}");
    }

    #[test]
    fn shared_fields_must_be_strings() {
        let err = serde_json::from_value::<BlueprintAction>(json!({
            "type": "APPEND_TO_FILE",
            "path": "README.md",
            "content": "more",
            "condition": true
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("`condition` must be a string"), "{err}");
    }

    #[test]
    fn serialized_actions_load_back() {
        let action = BlueprintAction::new(ActionKind::RunCommand {
            command: "npx".into(),
            args: vec!["prisma".into(), "generate".into()],
            cwd: Some("apps/web".into()),
            env: BTreeMap::from([("CI".to_string(), "1".to_string())]),
            abort_run: true,
        })
        .when("{{ module.parameters.generate }}")
        .for_each("module.parameters.apps");
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["abortRun"], true);
        let back: BlueprintAction = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }
}
