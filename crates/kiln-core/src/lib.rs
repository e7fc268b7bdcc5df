//! Kiln Core - blueprint execution engine.
//!
//! Kiln composes a project out of modules. Each module declares the
//! capabilities it provides and requires, and carries a blueprint: an ordered
//! list of declarative actions (create a file, merge JSON, add an import,
//! run a command...). The engine orders the modules, runs every blueprint
//! against a staging file system and writes the result to disk.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             kiln-cli (CLI)              │
//! │   apply / plan / modifiers / init       │
//! └──────────────────┬──────────────────────┘
//!                    │ calls
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Application Services            │
//! │  Orchestrator ─► BlueprintInterpreter   │
//! │       VirtualFileSystem, modifiers      │
//! └──────────────────┬──────────────────────┘
//!                    │ uses
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │        Application Ports (Traits)       │
//! │ Filesystem, CommandRunner, BlueprintStore│
//! └──────────────────┬──────────────────────┘
//!                    │ implemented by
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │     kiln-adapters (Infrastructure)      │
//! │ LocalFilesystem, ProcessRunner, catalog │
//! └─────────────────────────────────────────┘
//!
//!   Domain layer (pure): versions, capabilities, modules, blueprints,
//!   template context, dependency resolver.
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln_core::prelude::*;
//! # fn adapters() -> (Arc<dyn Filesystem>, Arc<dyn BlueprintStore>, Arc<dyn CommandRunner>) { unimplemented!() }
//!
//! let (fs, store, runner) = adapters();
//! let modules = vec![
//!     Module::builder("drizzle").provides("database@1.0.0").build().unwrap(),
//!     Module::builder("auth").requires("database@^1").build().unwrap(),
//! ];
//! let project = ProjectSettings::new("my-app");
//!
//! let report = Orchestrator::new(fs, store, runner)
//!     .run(&modules, &project)
//!     .unwrap();
//! assert!(report.success);
//! ```

pub mod domain;

pub mod application;

pub mod error;

// Public API - what external crates should use
pub mod prelude {
    pub use crate::application::{
        BlueprintInterpreter, CancellationToken, ExecutionResult, ModuleReport, Orchestrator,
        RunOptions, RunReport, VfsScope, VirtualFileSystem,
        modifiers::{Modifier, ModifierInput, ModifierRegistry, ParamSpec, ParamType, TransformError},
        ports::{BlueprintStore, CommandOutput, CommandRunner, CommandSpec, Filesystem},
    };
    pub use crate::domain::{
        ActionKind, Blueprint, BlueprintAction, ConflictResolution, ConflictStrategy,
        DependencyResolver, ImportSpec, Module, ModuleCategory, ModuleId, ProjectSettings,
        RelativePath, ResolutionIssue, ResolverOptions, TemplateContext,
    };
    pub use crate::error::{KilnError, KilnResult};
}

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
