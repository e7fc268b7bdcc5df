//! `js-export-wrapper`: wrap a module's default (or a named) export in a
//! higher-order function, e.g. `export default withAuth(Page)`.

use serde_json::Value;

use super::source::{
    ItemKind, SourceFile, declared_name, initializer, split_export_expression, to_js_literal,
};
use super::{
    Modifier, ModifierInput, ParamShape, ParamSpec, ParamType, TransformError, import_shape,
    non_blank, param_as, param_str,
};
use crate::domain::ImportSpec;

pub struct JsExportWrapper;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::required("wrapper", ParamType::String, "Function to wrap the export with"),
    ParamSpec::optional("import", ParamType::Object, "Import that provides the wrapper"),
    ParamSpec::optional("options", ParamType::Any, "Second argument passed to the wrapper"),
    ParamSpec::optional("export", ParamType::String, "Named export to wrap instead of the default"),
];

const SHAPES: &[ParamShape] = &[
    ParamShape::new("wrapper", non_blank),
    ParamShape::new("import", import_shape),
];

/// `wrapper(expr[, options])`
pub(crate) fn wrap_call(wrapper: &str, expr: &str, options: Option<&Value>) -> String {
    match options {
        Some(options) => format!("{wrapper}({expr}, {})", to_js_literal(options, "")),
        None => format!("{wrapper}({expr})"),
    }
}

pub(crate) fn is_wrapped(expr: &str, wrapper: &str) -> bool {
    expr.trim_start()
        .strip_prefix(wrapper)
        .is_some_and(|rest| rest.trim_start().starts_with('('))
}

fn wrap_default(
    file: &mut SourceFile,
    wrapper: &str,
    options: Option<&Value>,
) -> Result<(), TransformError> {
    let index = file
        .find(|k| matches!(k, ItemKind::ExportDefault))
        .ok_or_else(|| TransformError::new("no default export to wrap"))?;
    let code = file.items[index].code.clone();
    let (prefix, expr, end) = split_export_expression(&code)
        .ok_or_else(|| TransformError::new("unrecognised default export"))?;

    if is_wrapped(expr, wrapper) {
        return Ok(());
    }

    // A named declaration keeps its binding: split it from the export.
    let is_declaration = ["function", "async function", "class"]
        .iter()
        .any(|kw| expr.starts_with(kw));
    if is_declaration {
        if let Some(name) = declared_name(expr) {
            let declaration = format!("{expr}{end}");
            file.replace_code(index, declaration);
            file.insert_after(index, format!("export default {};", wrap_call(wrapper, &name, options)));
            return Ok(());
        }
    }

    file.replace_code(index, format!("{prefix}{}{end}", wrap_call(wrapper, expr, options)));
    Ok(())
}

fn wrap_named(
    file: &mut SourceFile,
    name: &str,
    wrapper: &str,
    options: Option<&Value>,
) -> Result<(), TransformError> {
    let index = file
        .find(|k| matches!(k, ItemKind::NamedExport(n) if n == name))
        .ok_or_else(|| TransformError::new(format!("no export named '{name}'")))?;
    let code = file.items[index].code.clone();
    let at = initializer(&code)
        .filter(|_| ["export const ", "export let ", "export var "].iter().any(|p| code.starts_with(p)))
        .ok_or_else(|| {
            TransformError::new(format!("export '{name}' must be a const/let/var binding"))
        })?;

    let body = code[at..].trim_end();
    let (expr, end) = match body.strip_suffix(';') {
        Some(expr) => (expr.trim_end(), ";"),
        None => (body, ""),
    };
    if is_wrapped(expr, wrapper) {
        return Ok(());
    }
    file.replace_code(
        index,
        format!("{}{}{end}", &code[..at], wrap_call(wrapper, expr, options)),
    );
    Ok(())
}

impl Modifier for JsExportWrapper {
    fn name(&self) -> &'static str {
        "js-export-wrapper"
    }

    fn description(&self) -> &'static str {
        "Wrap the default or a named export as wrapper(original, options)"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs"]
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn param_shapes(&self) -> &'static [ParamShape] {
        SHAPES
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let wrapper = param_str(input.params, "wrapper").unwrap_or_default().trim();
        if wrapper.is_empty() {
            return Err(TransformError::new("wrapper must not be empty"));
        }
        let import: Option<ImportSpec> = param_as(input.params, "import")?;
        let options = input.params.get("options").filter(|v| !v.is_null());

        let mut file = SourceFile::parse(input.current);
        match param_str(input.params, "export") {
            Some(name) => wrap_named(&mut file, name, wrapper, options)?,
            None => wrap_default(&mut file, wrapper, options)?,
        }
        if let Some(import) = &import {
            file.add_import(import);
        }
        Ok(file.print())
    }
}
