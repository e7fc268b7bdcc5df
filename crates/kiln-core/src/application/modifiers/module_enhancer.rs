//! `ts-module-enhancer`: add imports and top-level statements to a module.

use super::source::{ItemKind, SourceFile};
use super::{
    Modifier, ModifierInput, ParamShape, ParamSpec, ParamType, SCRIPT_TYPES, TransformError,
    import_list_shape, param_as,
};
use crate::domain::ImportSpec;

pub struct TsModuleEnhancer;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("imports", ParamType::Array, "Import declarations to add"),
    ParamSpec::optional("statements", ParamType::Array, "Top-level statements to append"),
];

const SHAPES: &[ParamShape] = &[
    ParamShape::new("imports", import_list_shape),
    ParamShape::decodes::<Vec<String>>("statements"),
];

/// Add `imports` and any `statements` not already present.
pub fn enhance(source: &str, imports: &[ImportSpec], statements: &[String]) -> String {
    let mut file = SourceFile::parse(source);
    for import in imports {
        file.add_import(import);
    }
    for statement in statements {
        if !statement.trim().is_empty() && !file.contains_statement(statement) {
            file.append_statement(statement);
        }
    }
    file.print()
}

/// Merge a whole incoming module into an existing one: its imports are
/// merged, its other statements appended when not already present.
pub fn merge_modules(existing: &str, incoming: &str) -> String {
    let incoming = SourceFile::parse(incoming);
    let mut imports = Vec::new();
    let mut statements = Vec::new();
    for item in &incoming.items {
        match &item.kind {
            ItemKind::Import(decl) => imports.push(ImportSpec {
                from: decl.source.clone(),
                default: decl.default.clone(),
                named: decl.named.clone(),
                namespace: decl.namespace.clone(),
                type_only: decl.type_only,
            }),
            // A module keeps its own directives.
            ItemKind::Directive => {}
            _ => statements.push(item.code.clone()),
        }
    }
    enhance(existing, &imports, &statements)
}

impl Modifier for TsModuleEnhancer {
    fn name(&self) -> &'static str {
        "ts-module-enhancer"
    }

    fn description(&self) -> &'static str {
        "Add imports (merged by specifier) and top-level statements to a JS/TS module"
    }

    fn supported_file_types(&self) -> &'static [&'static str] {
        SCRIPT_TYPES
    }

    fn params_schema(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn param_shapes(&self) -> &'static [ParamShape] {
        SHAPES
    }

    fn transform(&self, input: ModifierInput<'_>) -> Result<String, TransformError> {
        let imports: Vec<ImportSpec> = param_as(input.params, "imports")?.unwrap_or_default();
        let statements: Vec<String> = param_as(input.params, "statements")?.unwrap_or_default();
        if let Some(bad) = imports.iter().find(|i| i.from.trim().is_empty()) {
            return Err(TransformError::new(format!("import without a source: {bad:?}")));
        }
        Ok(enhance(input.current, &imports, &statements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RelativePath, TemplateContext};
    use serde_json::{Value, json};

    fn run(current: &str, params: Value) -> String {
        let path = RelativePath::try_new("src/db/index.ts").unwrap();
        let params = params.as_object().cloned().unwrap();
        let context = TemplateContext::empty();
        TsModuleEnhancer
            .transform(ModifierInput {
                path: &path,
                current,
                params: &params,
                context: &context,
            })
            .unwrap()
    }

    #[test]
    fn adds_imports_and_statements_once() {
        let current = "import { drizzle } from \"drizzle-orm/node-postgres\";\n\nexport const db = drizzle(process.env.DATABASE_URL!);\n";
        let params = json!({
            "imports": [
                {"from": "./schema", "namespace": "schema"},
                {"from": "drizzle-orm/node-postgres", "named": ["drizzle"]}
            ],
            "statements": ["export type Db = typeof db;"]
        });

        let once = run(current, params.clone());
        assert_eq!(
            once,
            "import { drizzle } from \"drizzle-orm/node-postgres\";\nimport * as schema from \"./schema\";\n\nexport const db = drizzle(process.env.DATABASE_URL!);\n\nexport type Db = typeof db;\n"
        );
        assert_eq!(run(&once, params), once);
    }

    #[test]
    fn merge_modules_combines_imports_and_drops_duplicates() {
        let existing = "import { a } from \"lib\";\n\nexport const x = a();\n";
        let incoming = "'use client';\nimport { b } from \"lib\";\n\nexport const x = a();\nexport const y = b();\n";
        let merged = merge_modules(existing, incoming);
        assert_eq!(
            merged,
            "import { a, b } from \"lib\";\n\nexport const x = a();\n\nexport const y = b();\n"
        );
    }
}
