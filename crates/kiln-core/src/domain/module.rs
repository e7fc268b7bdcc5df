//! Modules: the unit of selection.
//!
//! A module bundles one blueprint with the capabilities it provides and
//! requires. Identity is the `id`; a module is immutable once resolution
//! starts.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Capability, CapabilityRequirement, DomainError, capability::FOUNDATION};

// ============================================================================
// ModuleId
// ============================================================================

/// Unique module identifier (`framework/nextjs`, `drizzle`, `ui.shadcn`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId(String);

impl ModuleId {
    pub fn parse(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let valid = !id.is_empty()
            && !id.starts_with('/')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '@'));
        if valid {
            Ok(Self(id))
        } else {
            Err(DomainError::InvalidModuleId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ModuleId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ModuleId> for String {
    fn from(value: ModuleId) -> Self {
        value.0
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ModuleCategory
// ============================================================================

/// Informational grouping. Never influences execution order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    Framework,
    Database,
    Auth,
    Ui,
    Deployment,
    Testing,
    Tooling,
    Feature,
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Framework => "framework",
            Self::Database => "database",
            Self::Auth => "auth",
            Self::Ui => "ui",
            Self::Deployment => "deployment",
            Self::Testing => "testing",
            Self::Tooling => "tooling",
            Self::Feature => "feature",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Module
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    #[serde(default)]
    pub category: ModuleCategory,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub provides: Vec<Capability>,
    #[serde(default)]
    pub requires: Vec<CapabilityRequirement>,
    /// Modules that must run before this one regardless of capabilities.
    #[serde(default)]
    pub dependencies: Vec<ModuleId>,
}

impl Module {
    pub fn builder(id: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder {
            id: id.into(),
            ..ModuleBuilder::default()
        }
    }

    /// Whether this module provides the `foundation` capability.
    pub fn is_foundation(&self) -> bool {
        self.provides.iter().any(|c| c.name() == FOUNDATION)
    }

    /// Overlay parameters on top of this module's defaults (deep for objects).
    pub fn with_parameters(mut self, overrides: &Map<String, Value>) -> Self {
        for (key, value) in overrides {
            match (self.parameters.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    for (k, v) in incoming {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    self.parameters.insert(key.clone(), value.clone());
                }
            }
        }
        self
    }
}

/// Fluent, fallible construction for modules.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    id: String,
    category: ModuleCategory,
    parameters: Map<String, Value>,
    provides: Vec<String>,
    requires: Vec<String>,
    dependencies: Vec<String>,
}

impl ModuleBuilder {
    pub fn category(mut self, category: ModuleCategory) -> Self {
        self.category = category;
        self
    }

    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        self.provides.push(capability.into());
        self
    }

    pub fn requires(mut self, requirement: impl Into<String>) -> Self {
        self.requires.push(requirement.into());
        self
    }

    pub fn depends_on(mut self, module: impl Into<String>) -> Self {
        self.dependencies.push(module.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Module, DomainError> {
        Ok(Module {
            id: ModuleId::parse(self.id)?,
            category: self.category,
            parameters: self.parameters,
            provides: self
                .provides
                .iter()
                .map(|c| Capability::parse(c))
                .collect::<Result<_, _>>()?,
            requires: self
                .requires
                .iter()
                .map(|r| CapabilityRequirement::parse(r))
                .collect::<Result<_, _>>()?,
            dependencies: self
                .dependencies
                .into_iter()
                .map(ModuleId::parse)
                .collect::<Result<_, _>>()?,
        })
    }
}
