//! Structure catalog.
//!
//! The catalog is owned elsewhere; the runtime only reads it. Distributions
//! store structure ids, so every operation that needs categories, regions
//! or coordinates resolves those ids here first.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use geo_partition_engine::{Structure, StructureId};

use crate::error::Result;

/// Read access to the external structure catalog.
pub trait StructureCatalog {
    fn lookup(&self, id: StructureId) -> Option<Structure>;

    /// Every structure, in id order.
    fn all(&self) -> Vec<Structure>;

    /// Resolve `ids` in the given order. On failure returns every id that
    /// no longer resolves.
    fn resolve(&self, ids: &[StructureId]) -> std::result::Result<Vec<Structure>, Vec<StructureId>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in ids {
            match self.lookup(id) {
                Some(s) => found.push(s),
                None => missing.push(id),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(missing)
        }
    }
}

/// Catalog held in memory, keyed by structure id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    structures: BTreeMap<StructureId, Structure>,
}

impl InMemoryCatalog {
    pub fn new(structures: impl IntoIterator<Item = Structure>) -> Self {
        Self {
            structures: structures.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    /// Load a JSON array of structures.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let structures: Vec<Structure> = serde_json::from_str(&text)?;
        Ok(Self::new(structures))
    }

    /// Insert or replace a structure.
    pub fn insert(&mut self, structure: Structure) {
        self.structures.insert(structure.id, structure);
    }

    pub fn remove(&mut self, id: StructureId) -> Option<Structure> {
        self.structures.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }
}

impl StructureCatalog for InMemoryCatalog {
    fn lookup(&self, id: StructureId) -> Option<Structure> {
        self.structures.get(&id).cloned()
    }

    fn all(&self) -> Vec<Structure> {
        self.structures.values().cloned().collect()
    }
}
