//! Application ports (traits) for external dependencies.
//!
//! In hexagonal architecture, ports define interfaces that the application
//! needs from the outside world. Adapters in `kiln-adapters` implement these.
//!
//! ## Port Types
//!
//! - **Driven (Output) Ports**: Called by application, implemented by infrastructure
//!   - `Filesystem`: Reads through to, and flushes onto, the real project tree
//!   - `CommandRunner`: External processes (`RUN_COMMAND`)
//!   - `BlueprintStore`: Blueprint lookup per module
//!
//! - **Driving (Input) Ports**: Called by external world, implemented by application
//!   - (Defined in CLI layer, implemented by `Orchestrator`)

pub mod output;

pub use output::{BlueprintStore, CommandOutput, CommandRunner, CommandSpec, Filesystem};
