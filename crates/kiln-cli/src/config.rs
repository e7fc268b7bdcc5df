//! Application configuration.
//!
//! [`AppConfig`] is loaded once at startup and passed down by value.  The
//! CLI layer owns config; the core crate only sees the [`RunOptions`] built
//! from it.
//!
//! # Resolution order (highest priority first)
//!
//! 1. CLI flags (applied at the call-site, not here)
//! 2. `KILN_*` environment variables, `__` between nested keys
//!    (`KILN_ENGINE__HALT_ON_FAILURE=true`)
//! 3. Config file: `--config`, else `./.kiln.toml`, else the platform path
//! 4. Built-in defaults (always present)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use kiln_core::{application::VfsScope, domain::ResolverOptions, prelude::RunOptions};

use crate::cli::OutputFormat;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG: &str = ".kiln.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine behaviour.
    pub engine: EngineConfig,
    /// Where modules live.
    pub paths: PathsConfig,
    /// Output settings.
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub allow_conflicts: bool,
    pub halt_on_failure: bool,
    pub vfs_scope: VfsScopeSetting,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Capabilities that may have more than one provider.
    pub multi_provider_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VfsScopeSetting {
    #[default]
    PerModule,
    Shared,
}

impl From<VfsScopeSetting> for VfsScope {
    fn from(value: VfsScopeSetting) -> Self {
        match value {
            VfsScopeSetting::PerModule => VfsScope::PerModule,
            VfsScopeSetting::Shared => VfsScope::Shared,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Module catalog; relative paths are taken from the current directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub no_color: bool,
    pub format: OutputFormat,
}

impl AppConfig {
    /// Load configuration: defaults, then the config file, then `KILN_*`
    /// environment variables.
    ///
    /// `config_file` is the path from `--config`; a missing explicit file is
    /// an error, a missing default file is not.
    pub fn load(config_file: Option<&PathBuf>) -> anyhow::Result<Self> {
        let (path, required) = match config_file {
            Some(path) => (path.clone(), true),
            None => (Self::config_path(), false),
        };

        let settings = config::Config::builder()
            .add_source(
                config::Config::try_from(&Self::default())
                    .context("Failed to build default configuration")?,
            )
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                config::Environment::with_prefix("KILN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Configuration has invalid values")
    }

    /// Path of the configuration file used when `--config` is not given.
    ///
    /// `./.kiln.toml` wins when present; otherwise the platform config
    /// directory (via `directories::ProjectDirs`), falling back to
    /// `./.kiln.toml` when no home directory can be determined.
    pub fn config_path() -> PathBuf {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.is_file() {
            return local;
        }
        Self::global_path().unwrap_or(local)
    }

    /// Platform-specific config file location.
    pub fn global_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "kiln", "kiln")
            .map(|d| d.config_dir().join("config.toml"))
    }

    /// Catalog directory: explicit flag, then config, then `<genome dir>/modules`.
    pub fn modules_dir(&self, flag: Option<&Path>, genome: &Path) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.paths.modules_dir.clone())
            .unwrap_or_else(|| genome.parent().unwrap_or(Path::new(".")).join("modules"))
    }

    /// Engine options with no command-line overrides applied.
    pub fn run_options(&self) -> RunOptions {
        let engine = &self.engine;
        RunOptions {
            dry_run: false,
            halt_on_failure: engine.halt_on_failure,
            vfs_scope: engine.vfs_scope.into(),
            module_timeout: engine.module_timeout_secs.map(Duration::from_secs),
            command_timeout: engine.command_timeout_secs.map(Duration::from_secs),
            resolver: ResolverOptions {
                allow_conflicts: engine.allow_conflicts,
                multi_provider_capabilities: engine.multi_provider_capabilities.iter().cloned().collect(),
            },
        }
    }
}
