//! Explicit set of importers consulted by the orchestrator.

use std::sync::Arc;

use super::error::{MigrationError, Result};
use super::importer::Importer;

/// Importers keyed by entity name, in registration order.
///
/// Registration order is the tie-breaker when dependency ordering leaves a
/// choice, which keeps plans deterministic.
#[derive(Clone, Default)]
pub struct ImporterRegistry {
    importers: Vec<Arc<dyn Importer>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, importer: Arc<dyn Importer>) -> Result<()> {
        let name = importer.entity_name();
        if self.get(name).is_some() {
            return Err(MigrationError::DuplicateImporter(name.to_string()));
        }
        self.importers.push(importer);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, importer: Arc<dyn Importer>) -> Result<Self> {
        self.register(importer)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Importer>> {
        self.importers.iter().find(|i| i.entity_name() == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.importers.iter().position(|i| i.entity_name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.importers.iter().map(|i| i.entity_name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Importer>> {
        self.importers.iter()
    }

    pub fn len(&self) -> usize {
        self.importers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.importers.is_empty()
    }
}
