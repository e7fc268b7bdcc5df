//! Infrastructure adapters for Kiln.
//!
//! This crate implements the ports defined in `kiln-core::application::ports`
//! and reads the on-disk formats (module catalogs, genome files). It contains
//! all external dependencies and I/O operations.

pub mod blueprint_store;
pub mod catalog;
pub mod command;
pub mod error;
pub mod filesystem;
pub mod genome;

// Re-export commonly used adapters
pub use blueprint_store::InMemoryBlueprintStore;
pub use catalog::{CatalogEntry, ModuleCatalog};
pub use command::{ProcessRunner, RecordingRunner};
pub use error::CatalogError;
pub use filesystem::{LocalFilesystem, MemoryFilesystem};
pub use genome::{Genome, LoadedGenome};
