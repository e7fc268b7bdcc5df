//! Driven (output) ports - implemented by infrastructure.
//!
//! These traits define what the application needs from external systems.
//! The `kiln-adapters` crate provides implementations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{Blueprint, ModuleId};
use crate::error::KilnResult;

/// Port for filesystem operations.
///
/// Implemented by:
/// - `kiln_adapters::filesystem::LocalFilesystem` (production)
/// - `kiln_adapters::filesystem::MemoryFilesystem` (testing)
///
/// Paths handed to the port are already joined onto the project root.
#[cfg_attr(test, mockall::automock)]
pub trait Filesystem: Send + Sync {
    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> KilnResult<()>;

    /// Write content to a file, replacing it if present.
    fn write_file(&self, path: &Path, content: &str) -> KilnResult<()>;

    /// Read a whole file as UTF-8.
    fn read_to_string(&self, path: &Path) -> KilnResult<String>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;
}

/// A fully rendered external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished process reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Port for running external processes.
///
/// Implemented by:
/// - `kiln_adapters::command::ProcessRunner` (production)
/// - `kiln_adapters::command::RecordingRunner` (tests, previews)
///
/// A non-zero exit is a successful `run` returning a failing `CommandOutput`;
/// `Err` is reserved for "could not run at all" and timeouts.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> KilnResult<CommandOutput>;
}

/// Port for blueprint lookup.
///
/// Implemented by:
/// - `kiln_adapters::blueprint_store::InMemoryBlueprintStore`
/// - `kiln_adapters::catalog::ModuleCatalog` (module directories on disk)
#[cfg_attr(test, mockall::automock)]
pub trait BlueprintStore: Send + Sync {
    /// The blueprint belonging to a module.
    fn load(&self, module: &ModuleId) -> KilnResult<Blueprint>;

    /// Every module that has a blueprint.
    fn list(&self) -> KilnResult<Vec<ModuleId>>;
}
