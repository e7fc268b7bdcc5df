//! Capability graph data.
//!
//! A capability is an abstract feature (`database`, `auth`, `ui-kit`) that a
//! module either provides or requires. Modules never reference each other
//! directly for ordering; the resolver connects them through capabilities.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DomainError, ModuleId, Version, VersionRange, version::base_version};

/// Name of the capability whose providers are always ordered first.
pub const FOUNDATION: &str = "foundation";

// ============================================================================
// Capability (provided)
// ============================================================================

/// A capability a module provides, optionally versioned.
///
/// Written as `name` or `name@version`; `name@^2.0` declares version `2.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability {
    name: String,
    version: Option<Version>,
}

impl Capability {
    pub fn new(name: impl Into<String>, version: Option<Version>) -> Result<Self, DomainError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name, version })
    }

    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let input = input.trim();
        match input.split_once('@') {
            Some((name, version)) => {
                let version = base_version(version)
                    .map_err(|_| DomainError::InvalidCapability(input.to_string()))?;
                Self::new(name, Some(version))
            }
            None => Self::new(input, None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Whether this provider satisfies a requirement.
    ///
    /// Unversioned providers satisfy any range.
    pub fn satisfies(&self, requirement: &CapabilityRequirement) -> bool {
        if self.name != requirement.name {
            return false;
        }
        match &self.version {
            Some(version) => requirement.range.matches(version),
            None => true,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

impl TryFrom<String> for Capability {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.to_string()
    }
}

// ============================================================================
// CapabilityRequirement
// ============================================================================

/// A capability a module needs, constrained by a version range (default `*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequirementRepr")]
pub struct CapabilityRequirement {
    pub name: String,
    #[serde(rename = "version")]
    pub range: VersionRange,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequirementRepr {
    Short(String),
    Full {
        name: String,
        #[serde(default, alias = "versionRange", alias = "range")]
        version: Option<String>,
    },
}

impl TryFrom<RequirementRepr> for CapabilityRequirement {
    type Error = DomainError;

    fn try_from(value: RequirementRepr) -> Result<Self, Self::Error> {
        match value {
            RequirementRepr::Short(raw) => Self::parse(&raw),
            RequirementRepr::Full { name, version } => {
                Self::new(name, version.as_deref().unwrap_or("*"))
            }
        }
    }
}

impl CapabilityRequirement {
    pub fn new(name: impl Into<String>, range: &str) -> Result<Self, DomainError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            range: VersionRange::parse(range)?,
        })
    }

    /// Parse `name` or `name@range`.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        match input.trim().split_once('@') {
            Some((name, range)) => Self::new(name, range),
            None => Self::new(input.trim(), "*"),
        }
    }
}

impl fmt::Display for CapabilityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range.is_any() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}@{}", self.name, self.range)
        }
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'));
    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidCapability(name.to_string()))
    }
}

// ============================================================================
// CapabilityIndex
// ============================================================================

/// A provider entry: which module provides what, at what declaration index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub module: ModuleId,
    pub index: usize,
    pub capability: Capability,
}

/// Capability name → providers, in module declaration order.
#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    providers: BTreeMap<String, Vec<Provider>>,
}

impl CapabilityIndex {
    pub fn insert(&mut self, module: ModuleId, index: usize, capability: Capability) {
        self.providers
            .entry(capability.name().to_string())
            .or_default()
            .push(Provider {
                module,
                index,
                capability,
            });
    }

    pub fn providers(&self, name: &str) -> &[Provider] {
        self.providers.get(name).map_or(&[], Vec::as_slice)
    }

    /// Providers whose declared version satisfies the requirement.
    pub fn satisfying<'a>(
        &'a self,
        requirement: &'a CapabilityRequirement,
    ) -> impl Iterator<Item = &'a Provider> + 'a {
        self.providers(&requirement.name)
            .iter()
            .filter(move |p| p.capability.satisfies(requirement))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Provider])> {
        self.providers
            .iter()
            .map(|(name, providers)| (name.as_str(), providers.as_slice()))
    }
}
