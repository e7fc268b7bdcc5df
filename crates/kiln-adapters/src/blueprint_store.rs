//! In-memory blueprint store.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use kiln_core::{
    application::{ApplicationError, ports::BlueprintStore},
    domain::{Blueprint, ModuleId},
    error::{KilnError, KilnResult},
};

/// Thread-safe in-memory blueprint store. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlueprintStore {
    inner: Arc<RwLock<BTreeMap<ModuleId, Blueprint>>>,
}

impl InMemoryBlueprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register `blueprint` for `module`, replacing any previous one.
    pub fn insert(&self, module: ModuleId, blueprint: Blueprint) -> KilnResult<()> {
        blueprint.validate()?;
        self.inner
            .write()
            .map_err(|_| lock_error())?
            .insert(module, blueprint);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_error() -> KilnError {
    KilnError::Internal {
        message: "blueprint store lock poisoned".into(),
    }
}

impl BlueprintStore for InMemoryBlueprintStore {
    fn load(&self, module: &ModuleId) -> KilnResult<Blueprint> {
        let inner = self.inner.read().map_err(|_| lock_error())?;
        inner.get(module).cloned().ok_or_else(|| {
            ApplicationError::BlueprintNotFound {
                module: module.to_string(),
            }
            .into()
        })
    }

    fn list(&self) -> KilnResult<Vec<ModuleId>> {
        let inner = self.inner.read().map_err(|_| lock_error())?;
        Ok(inner.keys().cloned().collect())
    }
}
