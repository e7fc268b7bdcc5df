//! Application layer for Kiln.
//!
//! This layer contains:
//! - **Services**: the VFS, interpreter and orchestrator
//! - **Modifiers**: named, registered file transforms
//! - **Ports**: Interface definitions (traits) for external dependencies
//! - **Errors**: Application-specific error types
//!
//! Resolution rules and template semantics live in `crate::domain`; this
//! layer only sequences them and talks to the outside world through ports.

pub mod error;
pub mod modifiers;
pub mod ports;
pub mod services;

pub use services::{
    BlueprintInterpreter, CancellationToken, ExecutionResult, ModuleReport, Orchestrator,
    RunOptions, RunReport, VfsScope, VirtualFileSystem,
};

// Re-export port traits (for adapter implementation)
pub use ports::{BlueprintStore, CommandOutput, CommandRunner, CommandSpec, Filesystem};

pub use error::ApplicationError;
pub use modifiers::{Modifier, ModifierRegistry};
