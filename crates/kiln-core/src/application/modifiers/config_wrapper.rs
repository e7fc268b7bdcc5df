//! Config-file modifiers: `js-config-wrapper` and `js-config-merger`.
//!
//! Both work on the value a config module exports (`export default X` or
//! `module.exports = X`). The config object is found by following that value:
//! an object literal, an identifier bound by a top-level `const`, or the
//! first argument of a wrapper call.

use serde_json::{Map, Value};

use super::export_wrapper::{is_wrapped, wrap_call};
use super::source::{
    ItemKind, ObjectLiteral, SourceFile, balanced_end, call_arguments, initializer,
    is_identifier, split_export_expression,
};
use super::{
    Modifier, ModifierInput, ParamShape, ParamSpec, ParamType, TransformError, import_shape,
    non_blank, param_as, param_object, param_str,
};
use crate::domain::ImportSpec;

const CONFIG_TYPES: &[&str] = &["ts", "js", "mjs", "cjs", "mts", "cts"];

/// A span of an item's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    item: usize,
    start: usize,
    end: usize,
}

fn export_index(file: &SourceFile) -> Result<usize, TransformError> {
    file.find(|k| matches!(k, ItemKind::ExportDefault | ItemKind::ModuleExports))
        .ok_or_else(|| TransformError::new("no default export or module.exports found"))
}

/// Span of the exported expression, without the terminating `;`.
fn export_expression(file: &SourceFile, index: usize) -> Result<Span, TransformError> {
    let code = &file.items[index].code;
    let (prefix, expr, _) = split_export_expression(code)
        .ok_or_else(|| TransformError::new("unrecognised export statement"))?;
    Ok(Span {
        item: index,
        start: prefix.len(),
        end: prefix.len() + expr.len(),
    })
}

/// Follow an expression to the object literal that holds the config.
fn locate_object(file: &SourceFile, span: Span, hops: usize) -> Option<Span> {
    if hops > 8 {
        return None;
    }
    let code = &file.items[span.item].code;
    let raw = &code[span.start..span.end];
    let start = span.start + (raw.len() - raw.trim_start().len());
    let expr = raw.trim();

    if expr.starts_with('{') {
        let end = balanced_end(expr, 0);
        return Some(Span {
            item: span.item,
            start,
            end: start + end,
        });
    }

    // `{ ... } satisfies Config` / `as Config`
    let is_type_name = |t: &str| {
        !t.is_empty()
            && t.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '<' | '>'))
    };
    let base = expr
        .rsplit_once(" satisfies ")
        .or_else(|| expr.rsplit_once(" as "))
        .filter(|(_, ty)| is_type_name(ty.trim()))
        .map_or(expr, |(base, _)| base.trim_end());

    if is_identifier(base) {
        let decl = file.find_declaration(base)?;
        let decl_code = &file.items[decl].code;
        let at = initializer(decl_code)?;
        let body = decl_code[at..].trim_end();
        let body = body.strip_suffix(';').unwrap_or(body).trim_end();
        return locate_object(
            file,
            Span {
                item: decl,
                start: at,
                end: at + body.len(),
            },
            hops + 1,
        );
    }

    let (_, args) = call_arguments(base)?;
    let (arg_start, arg_end) = *args.first()?;
    locate_object(
        file,
        Span {
            item: span.item,
            start: start + arg_start,
            end: start + arg_end,
        },
        hops + 1,
    )
}

fn config_object(file: &SourceFile) -> Result<Span, TransformError> {
    let index = export_index(file)?;
    let expr = export_expression(file, index)?;
    locate_object(file, expr, 0)
        .ok_or_else(|| TransformError::new("could not find the exported config object"))
}

fn replace_span(file: &mut SourceFile, span: Span, text: &str) {
    let mut code = file.items[span.item].code.clone();
    code.replace_range(span.start..span.end, text);
    file.replace_code(span.item, code);
}

fn object_at(file: &SourceFile, span: Span) -> Result<ObjectLiteral, TransformError> {
    ObjectLiteral::parse(&file.items[span.item].code[span.start..span.end])
        .ok_or_else(|| TransformError::new("config object could not be parsed"))
}

/// `KEY: process.env.KEY ?? "default"` entries for the config's `env` block.
fn env_entries(env: &Map<String, Value>) -> Vec<(String, String)> {
    env.iter()
        .map(|(key, default)| {
            let lookup = format!("process.env.{key}");
            let value = match default {
                Value::Null => lookup,
                Value::String(s) => format!("{lookup} ?? {}", Value::String(s.clone())),
                other => format!("{lookup} ?? {other}"),
            };
            (key.clone(), value)
        })
        .collect()
}

fn inject_env(file: &mut SourceFile, env: &Map<String, Value>) -> Result<(), TransformError> {
    let span = config_object(file)?;
    let object = object_at(file, span)?;
    let entries = env_entries(env);

    let updated = match object.get("env") {
        Some(prop) => match ObjectLiteral::parse(object.value_text(prop)) {
            Some(existing) => {
                let inner = existing.add_raw(&entries);
                let mut text = object.text.clone();
                text.replace_range(prop.value.0..prop.value.1, &inner);
                text
            }
            None => return Err(TransformError::new("`env` is not an object literal")),
        },
        None => {
            let indent = object.indent();
            let block = ObjectLiteral::parse("{}")
                .map(|empty| empty.add_raw(&entries))
                .unwrap_or_default()
                .replace('\n', &format!("\n{indent}"));
            object.add_raw(&[("env".to_string(), block)])
        }
    };
    replace_span(file, span, &updated);
    Ok(())
}

// ============================================================================
// js-config-wrapper
// ============================================================================

pub struct JsConfigWrapper;

const WRAPPER_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("wrapper", ParamType::String, "Function to wrap the config with"),
    ParamSpec::optional("import", ParamType::Object, "Import that provides the wrapper"),
    ParamSpec::optional("options", ParamType::Any, "Second argument; merged into an existing one"),
    ParamSpec::optional("env", ParamType::Object, "KEY → default, injected into the config's env"),
];

const WRAPPER_SHAPES: &[ParamShape] = &[
    ParamShape::new("wrapper", non_blank),
    ParamShape::new("import", import_shape),
];

impl Modifier for JsConfigWrapper {
    fn name(&self) -> &'static str {
        "js-config-wrapper"
    }

    fn description(&self) -> &'static str {
        "Wrap a config file's exported value with a plugin function and inject env keys"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        CONFIG_TYPES
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        WRAPPER_PARAMS
    }

    fn param_shapes(&self) -> &'static [ParamShape] {
        WRAPPER_SHAPES
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let wrapper = param_str(input.params, "wrapper").unwrap_or_default().trim();
        if wrapper.is_empty() {
            return Err(TransformError::new("wrapper must not be empty"));
        }
        let import: Option<ImportSpec> = param_as(input.params, "import")?;
        let options = input.params.get("options").filter(|v| !v.is_null());

        let mut file = SourceFile::parse(input.current);

        if let Some(env) = param_object(input.params, "env").filter(|e| !e.is_empty()) {
            inject_env(&mut file, env)?;
        }

        let index = export_index(&file)?;
        let span = export_expression(&file, index)?;
        let expr = file.items[index].code[span.start..span.end].to_string();

        if !is_wrapped(&expr, wrapper) {
            replace_span(&mut file, span, &wrap_call(wrapper, &expr, options));
        } else if let Some(options) = options {
            merge_wrapper_options(&mut file, span, &expr, options)?;
        }

        if let Some(import) = &import {
            file.add_import(import);
        }
        Ok(file.print())
    }
}

/// Already wrapped: merge `options` into the existing second argument.
fn merge_wrapper_options(
    file: &mut SourceFile,
    span: Span,
    expr: &str,
    options: &Value,
) -> Result<(), TransformError> {
    let (_, args) = call_arguments(expr)
        .ok_or_else(|| TransformError::new("wrapped export is not a call"))?;
    let printed = super::source::to_js_literal(options, "");

    match (args.get(1), options) {
        (Some(&(start, end)), Value::Object(incoming)) => {
            let Some(existing) = ObjectLiteral::parse(&expr[start..end]) else {
                return Ok(());
            };
            let merged = existing.merge(incoming);
            replace_span(
                file,
                Span {
                    item: span.item,
                    start: span.start + start,
                    end: span.start + end,
                },
                &merged,
            );
        }
        (Some(_), _) => {}
        (None, _) => {
            let Some(&(_, first_end)) = args.first() else {
                return Ok(());
            };
            let at = span.start + first_end;
            replace_span(
                file,
                Span {
                    item: span.item,
                    start: at,
                    end: at,
                },
                &format!(", {printed}"),
            );
        }
    }
    Ok(())
}

// ============================================================================
// js-config-merger
// ============================================================================

pub struct JsConfigMerger;

const MERGER_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "config",
    ParamType::Object,
    "Keys merged into the exported config object",
)];

impl Modifier for JsConfigMerger {
    fn name(&self) -> &'static str {
        "js-config-merger"
    }

    fn description(&self) -> &'static str {
        "Merge keys into the object literal a config file exports"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        CONFIG_TYPES
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        MERGER_PARAMS
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let config = param_object(input.params, "config")
            .ok_or_else(|| TransformError::new("config: required"))?;

        let mut file = SourceFile::parse(input.current);
        let span = config_object(&file)?;
        let object = object_at(&file, span)?;
        let merged = object.merge(config);
        if merged != object.text {
            replace_span(&mut file, span, &merged);
        }
        Ok(file.print())
    }
}
