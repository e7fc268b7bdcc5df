//! Application services - the engine proper.
//!
//! - `vfs`: staged writes over the project root
//! - `conflict`: what `CREATE_FILE` does when its target exists
//! - `interpreter`: one blueprint against one VFS
//! - `orchestrator`: resolution plus the per-module loop

pub mod conflict;
pub mod interpreter;
pub mod orchestrator;
pub mod vfs;

#[cfg(test)]
pub(crate) mod testing;

pub use conflict::{ConflictResolver, Resolution};
pub use interpreter::{
    BlueprintInterpreter, CancellationToken, ExecutionResult, FileChange, InterpreterOptions,
};
pub use orchestrator::{ErrorReport, ModuleReport, Orchestrator, RunOptions, RunReport, VfsScope};
pub use vfs::{ChangeKind, FlushReport, VfsEntry, VirtualFileSystem};
