//! `schema-extender`: append exported definitions to a schema module.

use super::source::{ItemKind, SourceFile};
use serde_json::Value;

use super::{
    Modifier, ModifierInput, ParamShape, ParamSpec, ParamType, TransformError, decode,
    import_list_shape, param_as,
};
use crate::domain::{ImportSpec, SchemaDefinition};

pub struct SchemaExtender;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::required("definitions", ParamType::Array, "{ name, body } pairs to export"),
    ParamSpec::optional("imports", ParamType::Array, "Imports the definitions need"),
];

const SHAPES: &[ParamShape] = &[
    ParamShape::new("definitions", definitions_shape),
    ParamShape::new("imports", import_list_shape),
];

fn definitions_shape(value: &Value) -> Result<(), String> {
    check_definitions(&decode::<Vec<SchemaDefinition>>(value)?)
}

/// Every definition needs an identifier name and a non-empty body.
fn check_definitions(definitions: &[SchemaDefinition]) -> Result<(), String> {
    match definitions
        .iter()
        .find(|d| !super::source::is_identifier(&d.name) || d.body.trim().is_empty())
    {
        Some(bad) => Err(format!(
            "invalid definition '{}': needs an identifier name and a body",
            bad.name
        )),
        None => Ok(()),
    }
}

/// Add `export const <name> = <body>;` for every definition not yet exported.
pub fn extend(source: &str, definitions: &[SchemaDefinition], imports: &[ImportSpec]) -> String {
    let mut file = SourceFile::parse(source);
    for import in imports {
        file.add_import(import);
    }
    for definition in definitions {
        let exported = file
            .find(|k| matches!(k, ItemKind::NamedExport(n) if *n == definition.name))
            .is_some();
        if !exported {
            let body = definition.body.trim().trim_end_matches(';');
            file.append_statement(&format!("export const {} = {body};", definition.name));
        }
    }
    file.print()
}

impl Modifier for SchemaExtender {
    fn name(&self) -> &'static str {
        "schema-extender"
    }

    fn description(&self) -> &'static str {
        "Append exported schema definitions that are not already present"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        &["ts", "js", "mts", "mjs"]
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn param_shapes(&self) -> &'static [ParamShape] {
        SHAPES
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let definitions: Vec<SchemaDefinition> =
            param_as(input.params, "definitions")?.unwrap_or_default();
        let imports: Vec<ImportSpec> = param_as(input.params, "imports")?.unwrap_or_default();

        check_definitions(&definitions).map_err(TransformError::new)?;
        Ok(extend(input.current, &definitions, &imports))
    }
}
