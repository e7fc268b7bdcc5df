//! Test doubles shared by the service tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::{
    application::{
        ApplicationError,
        ports::{BlueprintStore, CommandOutput, CommandRunner, CommandSpec, Filesystem},
    },
    domain::{Blueprint, ModuleId},
    error::KilnResult,
};

#[derive(Default)]
pub struct FakeFilesystem {
    files: RwLock<BTreeMap<PathBuf, String>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
}

impl FakeFilesystem {
    pub fn with_file(path: &str, content: &str) -> Self {
        let fs = Self::default();
        fs.files
            .write()
            .unwrap()
            .insert(PathBuf::from(path), content.to_string());
        fs
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.files.read().unwrap().get(Path::new(path)).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.read().unwrap().contains(Path::new(path))
    }

    pub fn file_count(&self) -> usize {
        self.files.read().unwrap().len()
    }
}

impl Filesystem for FakeFilesystem {
    fn create_dir_all(&self, path: &Path) -> KilnResult<()> {
        let mut dirs = self.dirs.write().unwrap();
        for ancestor in path.ancestors() {
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn write_file(&self, path: &Path, content: &str) -> KilnResult<()> {
        self.files
            .write()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> KilnResult<String> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                ApplicationError::FileNotFound {
                    path: path.display().to_string(),
                }
                .into()
            })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path) || self.dirs.read().unwrap().contains(path)
    }
}

/// Records commands and answers with a fixed exit code.
pub struct ScriptedRunner {
    pub calls: Mutex<Vec<CommandSpec>>,
    code: i32,
}

impl ScriptedRunner {
    pub fn exiting_with(code: i32) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            code,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> KilnResult<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        Ok(CommandOutput {
            code: Some(self.code),
            stdout: String::new(),
            stderr: if self.code == 0 {
                String::new()
            } else {
                "scripted failure".into()
            },
        })
    }
}

#[derive(Default)]
pub struct FakeStore {
    blueprints: BTreeMap<ModuleId, Blueprint>,
}

impl FakeStore {
    pub fn with(mut self, module: &str, blueprint: Blueprint) -> Self {
        self.blueprints
            .insert(ModuleId::parse(module).unwrap(), blueprint);
        self
    }
}

impl BlueprintStore for FakeStore {
    fn load(&self, module: &ModuleId) -> KilnResult<Blueprint> {
        self.blueprints.get(module).cloned().ok_or_else(|| {
            ApplicationError::BlueprintNotFound {
                module: module.to_string(),
            }
            .into()
        })
    }

    fn list(&self) -> KilnResult<Vec<ModuleId>> {
        Ok(self.blueprints.keys().cloned().collect())
    }
}
