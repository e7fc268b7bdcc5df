//! JSON modifiers: generic merge, `package.json` and `tsconfig.json`.
//!
//! All three parse, merge as values and pretty-print with two-space indent.
//! When the merged value equals the parsed one the original text is returned
//! untouched, so re-applying a merge never reformats a file.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{
    Modifier, ModifierInput, ParamShape, ParamSpec, ParamType, TransformError, param_as, param_bool,
    param_object, param_str,
};
use crate::domain::ArrayMergePolicy;

/// Merge `source` into `target`.
///
/// Objects merge key by key when `deep`, otherwise top-level keys are
/// replaced. Arrays follow `arrays`: `concat` appends incoming items that are
/// not already present, `unique` also removes existing duplicates, `replace`
/// takes the incoming array.
pub fn merge_values(target: &mut Value, source: &Value, deep: bool, arrays: ArrayMergePolicy) {
    match (target, source) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(key) {
                    Some(slot) if deep => merge_values(slot, value, true, arrays),
                    _ => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(existing), Value::Array(incoming)) => match arrays {
            ArrayMergePolicy::Replace => existing.clone_from(incoming),
            ArrayMergePolicy::Concat => {
                for item in incoming {
                    if !existing.contains(item) {
                        existing.push(item.clone());
                    }
                }
            }
            ArrayMergePolicy::Unique => {
                let mut merged: Vec<Value> = Vec::with_capacity(existing.len() + incoming.len());
                for item in existing.iter().chain(incoming) {
                    if !merged.contains(item) {
                        merged.push(item.clone());
                    }
                }
                *existing = merged;
            }
        },
        (slot, value) => *slot = value.clone(),
    }
}

/// Parse a JSON document; blank input is an empty object.
pub fn parse_document(text: &str) -> Result<Value, TransformError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(text).map_err(|e| TransformError::new(format!("invalid JSON: {e}")))
}

/// Parse JSON that may contain `//` and `/* */` comments and trailing commas.
pub fn parse_jsonc(text: &str) -> Result<Value, TransformError> {
    parse_document(&strip_jsonc(text))
}

/// Remove comments and trailing commas outside string literals.
pub fn strip_jsonc(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut segment_start = 0;

    let flush = |out: &mut String, from: usize, to: usize| out.push_str(&text[from..to]);

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                flush(&mut out, segment_start, i);
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                segment_start = i;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                flush(&mut out, segment_start, i);
                i = text[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                segment_start = i;
            }
            b',' => {
                let next = text[i + 1..]
                    .trim_start()
                    .chars()
                    .next();
                if matches!(next, Some('}') | Some(']')) {
                    flush(&mut out, segment_start, i);
                    segment_start = i + 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    flush(&mut out, segment_start, bytes.len().min(text.len()));
    out
}

pub fn print_document(value: &Value) -> Result<String, TransformError> {
    serde_json::to_string_pretty(value)
        .map(|s| s + "\n")
        .map_err(|e| TransformError::new(e.to_string()))
}

/// Print `merged` unless it equals `original`, in which case keep `current`.
fn finish(current: &str, original: &Value, merged: &Value) -> Result<String, TransformError> {
    if original == merged && !current.trim().is_empty() {
        Ok(current.to_string())
    } else {
        print_document(merged)
    }
}

fn sorted(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ============================================================================
// json-merge
// ============================================================================

pub struct JsonMerge;

const JSON_MERGE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("content", ParamType::Object, "Object merged into the file"),
    ParamSpec::optional("deep", ParamType::Boolean, "Merge nested objects (default true)"),
    ParamSpec::optional("arrays", ParamType::String, "concat | replace | unique"),
];

const JSON_MERGE_SHAPES: &[ParamShape] = &[ParamShape::decodes::<ArrayMergePolicy>("arrays")];

impl Modifier for JsonMerge {
    fn name(&self) -> &'static str {
        "json-merge"
    }

    fn description(&self) -> &'static str {
        "Deep or shallow merge of an object into a JSON file (comments tolerated)"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        &["json", "jsonc"]
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        JSON_MERGE_PARAMS
    }

    fn param_shapes(&self) -> &'static [ParamShape] {
        JSON_MERGE_SHAPES
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let original = parse_jsonc(input.current)?;
        if !original.is_object() {
            return Err(TransformError::new("top-level value is not an object"));
        }
        let content = input
            .params
            .get("content")
            .ok_or_else(|| TransformError::new("content: required"))?;
        let deep = param_bool(input.params, "deep", true);
        let arrays = param_as::<ArrayMergePolicy>(input.params, "arrays")?.unwrap_or_default();

        let mut merged = original.clone();
        merge_values(&mut merged, content, deep, arrays);
        finish(input.current, &original, &merged)
    }
}

// ============================================================================
// package-json-merger
// ============================================================================

pub struct PackageJsonMerger;

const DEPENDENCY_FIELDS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

const PACKAGE_JSON_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("dependencies", ParamType::Object, "name → version"),
    ParamSpec::optional("devDependencies", ParamType::Object, "name → version"),
    ParamSpec::optional("peerDependencies", ParamType::Object, "name → version"),
    ParamSpec::optional("optionalDependencies", ParamType::Object, "name → version"),
    ParamSpec::optional("scripts", ParamType::Object, "script name → command"),
    ParamSpec::optional("fields", ParamType::Object, "Any other keys, merged deep"),
];

type StringMap = BTreeMap<String, String>;

const PACKAGE_JSON_SHAPES: &[ParamShape] = &[
    ParamShape::decodes::<StringMap>("dependencies"),
    ParamShape::decodes::<StringMap>("devDependencies"),
    ParamShape::decodes::<StringMap>("peerDependencies"),
    ParamShape::decodes::<StringMap>("optionalDependencies"),
    ParamShape::decodes::<StringMap>("scripts"),
];

impl Modifier for PackageJsonMerger {
    fn name(&self) -> &'static str {
        "package-json-merger"
    }

    fn description(&self) -> &'static str {
        "Merge dependencies (kept sorted), scripts and other fields into package.json"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        &["package.json"]
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        PACKAGE_JSON_PARAMS
    }

    fn param_shapes(&self) -> &'static [ParamShape] {
        PACKAGE_JSON_SHAPES
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let original = parse_document(input.current)?;
        let Value::Object(mut package) = original.clone() else {
            return Err(TransformError::new("package.json is not an object"));
        };

        if let Some(fields) = param_object(input.params, "fields") {
            let mut value = Value::Object(package);
            merge_values(
                &mut value,
                &Value::Object(fields.clone()),
                true,
                ArrayMergePolicy::Concat,
            );
            package = match value {
                Value::Object(map) => map,
                _ => Map::new(),
            };
        }

        for field in DEPENDENCY_FIELDS {
            let Some(incoming) = param_object(input.params, field) else {
                continue;
            };
            let mut deps = package
                .get(*field)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            for (name, version) in incoming {
                deps.insert(name.clone(), version.clone());
            }
            package.insert((*field).to_string(), Value::Object(sorted(&deps)));
        }

        if let Some(incoming) = param_object(input.params, "scripts") {
            let scripts = package
                .entry("scripts")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(scripts) = scripts {
                for (name, command) in incoming {
                    scripts.insert(name.clone(), command.clone());
                }
            }
        }

        finish(input.current, &original, &Value::Object(package))
    }
}

// ============================================================================
// tsconfig-enhancer
// ============================================================================

pub struct TsconfigEnhancer;

const TSCONFIG_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("compilerOptions", ParamType::Object, "Merged deep"),
    ParamSpec::optional("paths", ParamType::Object, "Alias → targets, into compilerOptions.paths"),
    ParamSpec::optional("include", ParamType::Array, "Globs added without duplicates"),
    ParamSpec::optional("exclude", ParamType::Array, "Globs added without duplicates"),
    ParamSpec::optional("extends", ParamType::String, "Base config"),
];

const TSCONFIG_SHAPES: &[ParamShape] = &[
    ParamShape::decodes::<BTreeMap<String, Vec<String>>>("paths"),
    ParamShape::decodes::<Vec<String>>("include"),
    ParamShape::decodes::<Vec<String>>("exclude"),
];

impl Modifier for TsconfigEnhancer {
    fn name(&self) -> &'static str {
        "tsconfig-enhancer"
    }

    fn description(&self) -> &'static str {
        "Merge compiler options, path aliases and include/exclude globs into tsconfig"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        &["json", "jsonc"]
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        TSCONFIG_PARAMS
    }

    fn param_shapes(&self) -> &'static [ParamShape] {
        TSCONFIG_SHAPES
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let original = parse_jsonc(input.current)?;
        let mut config = original.clone();
        if !config.is_object() {
            return Err(TransformError::new("tsconfig is not an object"));
        }

        let mut patch = Map::new();
        if let Some(options) = param_object(input.params, "compilerOptions") {
            patch.insert("compilerOptions".into(), Value::Object(options.clone()));
        }
        if let Some(paths) = param_object(input.params, "paths") {
            let mut options = Map::new();
            options.insert("paths".into(), Value::Object(paths.clone()));
            merge_values(
                patch
                    .entry("compilerOptions")
                    .or_insert_with(|| Value::Object(Map::new())),
                &Value::Object(options),
                true,
                ArrayMergePolicy::Unique,
            );
        }
        for key in ["include", "exclude"] {
            if let Some(globs) = input.params.get(key).filter(|v| v.is_array()) {
                patch.insert(key.into(), globs.clone());
            }
        }
        if let Some(base) = param_str(input.params, "extends") {
            patch.insert("extends".into(), Value::String(base.to_string()));
        }

        merge_values(&mut config, &Value::Object(patch), true, ArrayMergePolicy::Unique);
        finish(input.current, &original, &config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RelativePath, TemplateContext};
    use serde_json::json;

    fn run(modifier: &dyn Modifier, path: &str, current: &str, params: Value) -> String {
        let path = RelativePath::try_new(path).unwrap();
        let params = params.as_object().cloned().unwrap();
        let context = TemplateContext::empty();
        modifier
            .transform(ModifierInput {
                path: &path,
                current,
                params: &params,
                context: &context,
            })
            .unwrap()
    }

    #[test]
    fn deep_merge_preserves_unrelated_keys() {
        let mut target = json!({"a": 1, "nested": {"x": 1}});
        merge_values(
            &mut target,
            &json!({"b": 2, "nested": {"y": 2}}),
            true,
            ArrayMergePolicy::Concat,
        );
        assert_eq!(target, json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 2}}));
    }

    #[test]
    fn shallow_merge_replaces_nested_objects() {
        let mut target = json!({"nested": {"x": 1}});
        merge_values(&mut target, &json!({"nested": {"y": 2}}), false, ArrayMergePolicy::Concat);
        assert_eq!(target, json!({"nested": {"y": 2}}));
    }

    #[test]
    fn array_policies() {
        let mut concat = json!([1, 1, 2]);
        merge_values(&mut concat, &json!([2, 3]), true, ArrayMergePolicy::Concat);
        assert_eq!(concat, json!([1, 1, 2, 3]));

        let mut unique = json!([1, 1, 2]);
        merge_values(&mut unique, &json!([2, 3]), true, ArrayMergePolicy::Unique);
        assert_eq!(unique, json!([1, 2, 3]));

        let mut replace = json!([1, 2]);
        merge_values(&mut replace, &json!([3]), true, ArrayMergePolicy::Replace);
        assert_eq!(replace, json!([3]));
    }

    #[test]
    fn json_merge_is_idempotent() {
        let once = run(&JsonMerge, "a.json", "{\"a\":1}", json!({"content": {"b": 2}}));
        assert_eq!(once, "{\n  \"a\": 1,\n  \"b\": 2\n}\n");
        let twice = run(&JsonMerge, "a.json", &once, json!({"content": {"b": 2}}));
        assert_eq!(twice, once);
    }

    #[test]
    fn package_json_dependencies_are_sorted() {
        let current = r#"{"name": "app", "dependencies": {"zod": "^3.0.0", "next": "14.0.0"}}"#;
        let out = run(
            &PackageJsonMerger,
            "package.json",
            current,
            json!({
                "dependencies": {"drizzle-orm": "^0.30.0"},
                "scripts": {"db:push": "drizzle-kit push"}
            }),
        );
        let value: Value = serde_json::from_str(&out).unwrap();
        let deps: Vec<_> = value["dependencies"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(deps, ["drizzle-orm", "next", "zod"]);
        assert_eq!(value["scripts"]["db:push"], "drizzle-kit push");
        assert_eq!(value["name"], "app");

        let again = run(
            &PackageJsonMerger,
            "package.json",
            &out,
            json!({"dependencies": {"drizzle-orm": "^0.30.0"}}),
        );
        assert_eq!(again, out);
    }

    #[test]
    fn tsconfig_tolerates_comments_and_trailing_commas() {
        let current = r#"{
  // editor settings
  "compilerOptions": {
    "strict": true, /* keep */
  },
  "include": ["src"],
}"#;
        let out = run(
            &TsconfigEnhancer,
            "tsconfig.json",
            current,
            json!({
                "paths": {"@/*": ["./src/*"]},
                "include": ["src", "drizzle.config.ts"]
            }),
        );
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["compilerOptions"]["strict"], true);
        assert_eq!(value["compilerOptions"]["paths"]["@/*"], json!(["./src/*"]));
        assert_eq!(value["include"], json!(["src", "drizzle.config.ts"]));
    }

    #[test]
    fn tsconfig_noop_keeps_comments() {
        let current = "{\n  // hi\n  \"include\": [\"src\"]\n}\n";
        let out = run(&TsconfigEnhancer, "tsconfig.json", current, json!({"include": ["src"]}));
        assert_eq!(out, current);
    }

    #[test]
    fn strip_jsonc_leaves_strings_alone() {
        let text = r#"{"url": "http://x.com/*not*/", "a": [1,],}"#;
        let value = parse_jsonc(text).unwrap();
        assert_eq!(value, json!({"url": "http://x.com/*not*/", "a": [1]}));
    }
}
