//! Declaration registry for compiled variables
//!
//! Readers take the read lock and clone an `Arc`; mutation goes through the
//! engine, which serializes declares behind its own mutex. Compiled forms
//! are immutable, so a handle obtained before a redeclare keeps evaluating
//! with the definitions it captured.

use crate::variable::CompiledVariable;
use indexmap::IndexMap;
use parking_lot::RwLock;
use quantab_model::VariableConfiguration;
use std::sync::Arc;

struct Registered {
    config: VariableConfiguration,
    compiled: Arc<CompiledVariable>,
}

/// Case-insensitive map of declared variables, in declaration order
#[derive(Default)]
pub(crate) struct VariableRegistry {
    inner: RwLock<IndexMap<String, Registered>>,
}

impl VariableRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The compiled variable for an identifier, if declared
    pub(crate) fn get(&self, identifier: &str) -> Option<Arc<CompiledVariable>> {
        self.inner
            .read()
            .get(&identifier.to_ascii_lowercase())
            .map(|entry| Arc::clone(&entry.compiled))
    }

    /// The stored configuration for an identifier, if declared
    pub(crate) fn config(&self, identifier: &str) -> Option<VariableConfiguration> {
        self.inner
            .read()
            .get(&identifier.to_ascii_lowercase())
            .map(|entry| entry.config.clone())
    }

    /// Publish a compiled variable, replacing any prior registration
    pub(crate) fn publish(
        &self,
        config: VariableConfiguration,
        compiled: Arc<CompiledVariable>,
    ) {
        let key = config.key();
        self.inner.write().insert(key, Registered { config, compiled });
    }

    /// Declared identifiers in declaration order, for diagnostics
    pub(crate) fn identifiers(&self) -> Vec<String> {
        self.inner
            .read()
            .values()
            .map(|entry| entry.config.identifier.clone())
            .collect()
    }
}
