//! Genome files: which catalog modules a project is built from.
//!
//! ```toml
//! [project]
//! name = "my-app"
//! root = "."                 # relative to the genome file
//!
//! [paths]
//! components = "src/components"
//!
//! [[modules]]
//! id = "nextjs"
//!
//! [[modules]]
//! id = "drizzle"
//! parameters = { tables = ["users", "posts"] }
//! ```
//!
//! The same shape is accepted as JSON when the file ends in `.json`.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use kiln_core::domain::{Module, ModuleId, ProjectSettings};

use crate::{catalog::ModuleCatalog, error::CatalogError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Genome {
    pub project: ProjectSection,
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
    #[serde(default)]
    pub modules: Vec<ModuleSelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSelection {
    pub id: String,
    /// Overrides for the module's default parameters (deep for objects).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

/// A parsed genome plus where it was read from.
#[derive(Debug, Clone)]
pub struct LoadedGenome {
    pub genome: Genome,
    pub path: PathBuf,
}

impl Genome {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedGenome, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;

        let genome: Genome = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw).map_err(|e| CatalogError::parse(path, e))?,
            _ => Self::from_toml(&raw).map_err(|e| CatalogError::parse(path, e))?,
        };

        if genome.project.name.trim().is_empty() {
            return Err(CatalogError::Invalid {
                path: path.to_path_buf(),
                reason: "project.name must not be empty".into(),
            });
        }
        debug!(project = %genome.project.name, modules = genome.modules.len(), "Genome loaded");
        Ok(LoadedGenome {
            genome,
            path: path.to_path_buf(),
        })
    }

    /// Look every selected module up in `catalog` and apply parameter overrides.
    pub fn select(&self, catalog: &ModuleCatalog) -> Result<Vec<Module>, CatalogError> {
        self.modules
            .iter()
            .map(|selection| {
                let id = ModuleId::parse(selection.id.as_str())?;
                let entry = catalog.get(&id).ok_or_else(|| CatalogError::UnknownModule {
                    id: selection.id.clone(),
                    available: catalog.ids(),
                })?;
                Ok(entry.module.clone().with_parameters(&selection.parameters))
            })
            .collect()
    }
}

impl LoadedGenome {
    /// Project settings with `root` resolved against the genome's directory.
    /// `root_override` (from the command line) wins when given.
    pub fn project(&self, root_override: Option<&Path>) -> ProjectSettings {
        let base = self.path.parent().unwrap_or(Path::new("."));
        let root = match (root_override, &self.genome.project.root) {
            (Some(root), _) => root.to_path_buf(),
            (None, Some(root)) => base.join(root),
            (None, None) => base.to_path_buf(),
        };
        ProjectSettings {
            name: self.genome.project.name.clone(),
            root: root.display().to_string(),
            paths: self.genome.paths.clone(),
        }
    }
}
