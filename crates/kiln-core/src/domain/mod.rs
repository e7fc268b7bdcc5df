// ============================================================================
//  CLEAN MODULE BOUNDARIES
// ============================================================================

//! Core domain layer for Kiln.
//!
//! This module contains pure logic with no I/O. Everything that touches the
//! filesystem or spawns processes goes through ports defined in the
//! application layer.
//!
//! ## Contents
//!
//! - **Versions & capabilities**: what modules provide and require
//! - **Modules & blueprints**: the unit of selection and its script
//! - **Template context**: `{{ reference }}` rendering and conditions
//! - **Resolver**: capability graph → execution order
//!
//! All domain objects are `Clone + PartialEq`; resolution is deterministic.
pub mod blueprint;
pub mod capability;
pub mod common;
pub mod context;
pub mod error;
pub mod module;
pub mod resolver;
pub mod version;

mod validation;

pub use blueprint::{
    ActionKind, ArrayMergePolicy, Blueprint, BlueprintAction, ConflictResolution,
    ConflictStrategy, ImportSpec, MergeStrategy, MissingFilePolicy, SchemaDefinition,
};
pub use capability::{Capability, CapabilityIndex, CapabilityRequirement, FOUNDATION, Provider};
pub use common::RelativePath;
pub use context::{ProjectSettings, TemplateContext};
pub use error::{DomainError, ErrorCategory};
pub use module::{Module, ModuleBuilder, ModuleCategory, ModuleId};
pub use resolver::{
    DependencyResolver, IssueCode, ResolutionIssue, ResolutionResult, ResolverOptions, Severity,
};
pub use validation::DomainValidator;
pub use version::{Version, VersionRange};
