//! Filesystem module catalog.
//!
//! Discovers `module.toml` manifests under a directory tree and turns each
//! into a domain [`Module`] plus its [`Blueprint`].
//!
//! # Directory layout expected
//!
//! ```text
//! modules/
//! ├── nextjs/
//! │   └── module.toml          ← manifest with inline [blueprint]
//! └── drizzle/
//!     ├── module.toml          ← manifest only
//!     └── blueprint.json       ← blueprint kept as JSON
//! ```
//!
//! # `module.toml` format
//!
//! ```toml
//! [module]
//! id           = "drizzle"
//! category     = "database"          # informational only
//! provides     = ["database@0.36"]
//! dependencies = []                   # explicit module ordering
//!
//! [[requires]]
//! name    = "framework"
//! version = "^15"                     # optional, defaults to "*"
//!
//! [parameters]                        # defaults, overridable per genome
//! tables = ["users"]
//!
//! [blueprint]                         # or a sibling blueprint.json
//! name = "Drizzle ORM"
//!
//! [[blueprint.actions]]
//! type     = "INSTALL_PACKAGES"
//! packages = ["drizzle-orm@^0.36.0"]
//! ```

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use kiln_core::{
    application::{ApplicationError, ports::BlueprintStore},
    domain::{Blueprint, DomainValidator, Module, ModuleCategory, ModuleId},
    error::KilnResult,
};

use crate::error::CatalogError;

pub const MANIFEST_FILE: &str = "module.toml";
pub const BLUEPRINT_FILE: &str = "blueprint.json";

// ── Manifest types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    pub module: ModuleSection,
    #[serde(default)]
    pub requires: Vec<RequirementEntry>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Inline blueprint. When absent, `blueprint.json` must sit next to the manifest.
    pub blueprint: Option<toml::Table>,
}

/// `[module]` section.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ModuleSection {
    pub id: String,
    #[serde(default)]
    pub category: ModuleCategory,
    pub description: Option<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One `[[requires]]` entry, or a plain `"name@range"` string.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RequirementEntry {
    Short(String),
    Full {
        name: String,
        version: Option<String>,
    },
}

impl RequirementEntry {
    fn declaration(&self) -> String {
        match self {
            Self::Short(s) => s.clone(),
            Self::Full {
                name,
                version: Some(version),
            } => format!("{name}@{version}"),
            Self::Full { name, version: None } => name.clone(),
        }
    }
}

/// A loaded module with the blueprint that ships with it.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub module: Module,
    pub blueprint: Blueprint,
    pub description: Option<String>,
    pub dir: PathBuf,
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// Every module found under a catalog root.
///
/// A directory whose manifest is malformed is skipped with a `WARN` log and
/// kept in [`ModuleCatalog::skipped`]; it does not prevent the other modules
/// from loading. Two manifests declaring the same id are a hard error.
#[derive(Debug, Default)]
pub struct ModuleCatalog {
    root: PathBuf,
    entries: BTreeMap<ModuleId, CatalogEntry>,
    skipped: Vec<(PathBuf, String)>,
}

impl ModuleCatalog {
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CatalogError::NotFound {
                path: root.to_path_buf(),
            });
        }

        let mut catalog = Self {
            root: root.to_path_buf(),
            ..Self::default()
        };

        for walk_entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let walk_entry = walk_entry.map_err(|e| CatalogError::Invalid {
                path: root.to_path_buf(),
                reason: format!("directory walk error: {e}"),
            })?;
            if !walk_entry.file_type().is_file() || walk_entry.file_name() != MANIFEST_FILE {
                continue;
            }
            let manifest_path = walk_entry.path();
            let dir = manifest_path.parent().unwrap_or(root).to_path_buf();

            match load_entry(manifest_path, &dir) {
                Ok(entry) => catalog.insert(entry)?,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping module directory");
                    catalog.skipped.push((dir, e.to_string()));
                }
            }
        }

        debug!(
            count = catalog.entries.len(),
            skipped = catalog.skipped.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    fn insert(&mut self, entry: CatalogEntry) -> Result<(), CatalogError> {
        if let Some(existing) = self.entries.get(&entry.module.id) {
            return Err(CatalogError::DuplicateModule {
                id: entry.module.id.to_string(),
                first: existing.dir.clone(),
                second: entry.dir,
            });
        }
        debug!(module = %entry.module.id, actions = entry.blueprint.actions.len(), "Loaded module");
        self.entries.insert(entry.module.id.clone(), entry);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, id: &ModuleId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().map(|id| id.to_string()).collect()
    }

    /// Directories that failed to load, with the reason.
    pub fn skipped(&self) -> &[(PathBuf, String)] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BlueprintStore for ModuleCatalog {
    fn load(&self, module: &ModuleId) -> KilnResult<Blueprint> {
        self.entries
            .get(module)
            .map(|entry| entry.blueprint.clone())
            .ok_or_else(|| {
                ApplicationError::BlueprintNotFound {
                    module: module.to_string(),
                }
                .into()
            })
    }

    fn list(&self) -> KilnResult<Vec<ModuleId>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

// ── Loading one module ────────────────────────────────────────────────────────

fn load_entry(manifest_path: &Path, dir: &Path) -> Result<CatalogEntry, CatalogError> {
    let raw = fs::read_to_string(manifest_path).map_err(|e| CatalogError::io(manifest_path, e))?;
    let manifest: ModuleManifest =
        toml::from_str(&raw).map_err(|e| CatalogError::parse(manifest_path, e))?;

    let mut builder = Module::builder(&manifest.module.id).category(manifest.module.category);
    for capability in &manifest.module.provides {
        builder = builder.provides(capability);
    }
    for requirement in &manifest.requires {
        builder = builder.requires(requirement.declaration());
    }
    for dependency in &manifest.module.dependencies {
        builder = builder.depends_on(dependency);
    }
    for (key, value) in manifest.parameters {
        builder = builder.parameter(key, value);
    }
    let module = builder.build()?;

    let blueprint = match manifest.blueprint {
        Some(table) => {
            let mut table = table;
            if !table.contains_key("id") {
                table.insert("id".into(), toml::Value::String(manifest.module.id.clone()));
            }
            toml::Value::Table(table)
                .try_into::<Blueprint>()
                .map_err(|e| CatalogError::parse(manifest_path, e))?
        }
        None => load_json_blueprint(&dir.join(BLUEPRINT_FILE), &manifest.module.id)?,
    };

    DomainValidator::validate_module(&module)
        .and_then(|()| DomainValidator::validate_blueprint(&blueprint))
        .map_err(|e| CatalogError::Invalid {
            path: manifest_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(CatalogEntry {
        module,
        blueprint,
        description: manifest.module.description,
        dir: dir.to_path_buf(),
    })
}

fn load_json_blueprint(path: &Path, module_id: &str) -> Result<Blueprint, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
    let mut value: Value = serde_json::from_str(&raw).map_err(|e| CatalogError::parse(path, e))?;
    if let Value::Object(map) = &mut value {
        map.entry("id")
            .or_insert_with(|| Value::String(module_id.to_string()));
    }
    serde_json::from_value(value).map_err(|e| CatalogError::parse(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::domain::ActionKind;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn id(s: &str) -> ModuleId {
        ModuleId::parse(s).unwrap()
    }

    const DRIZZLE: &str = r#"
[module]
id = "drizzle"
category = "database"
provides = ["database@0.36"]

[[requires]]
name = "framework"
version = "^15"

[parameters]
tables = ["users"]

[blueprint]
name = "Drizzle ORM"

[[blueprint.actions]]
type = "INSTALL_PACKAGES"
packages = ["drizzle-orm@^0.36.0"]

[[blueprint.actions]]
type = "MERGE_JSON"
path = "tsconfig.json"
content = { compilerOptions = { strict = true } }

[[blueprint.actions]]
type = "CREATE_FILE"
path = "src/db/{{ item }}.ts"
content = "export {};\n"
forEach = "module.parameters.tables"
"#;

    #[test]
    fn loads_inline_blueprint_and_module_metadata() {
        let root = TempDir::new().unwrap();
        write(root.path(), "drizzle/module.toml", DRIZZLE);

        let catalog = ModuleCatalog::open(root.path()).unwrap();
        let entry = catalog.get(&id("drizzle")).unwrap();

        assert_eq!(entry.module.category, ModuleCategory::Database);
        assert_eq!(entry.module.provides.len(), 1);
        assert_eq!(entry.module.requires.len(), 1);
        assert_eq!(entry.module.parameters["tables"], serde_json::json!(["users"]));

        let blueprint = catalog.load(&id("drizzle")).unwrap();
        assert_eq!(blueprint.id, "drizzle");
        assert_eq!(blueprint.name, "Drizzle ORM");
        assert_eq!(blueprint.actions.len(), 3);
        assert!(matches!(
            &blueprint.actions[1].kind,
            ActionKind::MergeJson { content, deep: true, .. } if content["compilerOptions"]["strict"] == true
        ));
        assert_eq!(blueprint.actions[2].for_each.as_deref(), Some("module.parameters.tables"));
    }

    #[test]
    fn loads_sibling_blueprint_json() {
        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "frameworks/nextjs/module.toml",
            "[module]\nid = \"nextjs\"\nprovides = [\"foundation\", \"framework@15.0\"]\n",
        );
        write(
            root.path(),
            "frameworks/nextjs/blueprint.json",
            r#"{"actions": [{"type": "ADD_SCRIPT", "name": "dev", "command": "next dev"}]}"#,
        );

        let catalog = ModuleCatalog::open(root.path()).unwrap();
        assert!(catalog.get(&id("nextjs")).unwrap().module.is_foundation());
        let blueprint = catalog.load(&id("nextjs")).unwrap();
        assert_eq!(blueprint.id, "nextjs");
        assert_eq!(blueprint.actions[0].kind.name(), "ADD_SCRIPT");
    }

    #[test]
    fn broken_module_is_skipped_not_fatal() {
        let root = TempDir::new().unwrap();
        write(root.path(), "drizzle/module.toml", DRIZZLE);
        write(root.path(), "broken/module.toml", "[module]\nid = \"broken\"\n");
        write(
            root.path(),
            "bad-action/module.toml",
            "[module]\nid = \"bad\"\n[[blueprint.actions]]\ntype = \"FORMAT_DISK\"\n",
        );

        let catalog = ModuleCatalog::open(root.path()).unwrap();
        assert_eq!(catalog.ids(), ["drizzle"]);
        assert_eq!(catalog.skipped().len(), 2);
    }

    #[test]
    fn duplicate_ids_are_an_error() {
        let root = TempDir::new().unwrap();
        write(root.path(), "a/module.toml", DRIZZLE);
        write(root.path(), "b/module.toml", DRIZZLE);

        let err = ModuleCatalog::open(root.path()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateModule { ref id, .. } if id == "drizzle"));
    }

    #[test]
    fn missing_root_is_not_found() {
        let root = TempDir::new().unwrap();
        let err = ModuleCatalog::open(root.path().join("nope")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn short_requirement_strings_are_accepted() {
        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "auth/module.toml",
            "requires = [\"database@^0.36\"]\n\n[module]\nid = \"auth\"\n\n[blueprint]\nactions = []\n",
        );
        let catalog = ModuleCatalog::open(root.path()).unwrap();
        assert_eq!(catalog.get(&id("auth")).unwrap().module.requires.len(), 1);
    }
}
