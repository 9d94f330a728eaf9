//! Manual adjustments to a stored distribution.
//!
//! Swaps are an operator escape hatch: they exchange two partner slots
//! without re-checking proximity or balance. Removals delete rows by the
//! category or region of their structure and keep the header even when
//! nothing is left.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use geo_partition_engine::invariants::try_validate_distribution;
use geo_partition_engine::{Assignment, Distribution, DistributionId, Structure, StructureId};

use crate::catalog::StructureCatalog;
use crate::error::{Error, Result};
use crate::store::AssignmentStore;

pub struct ManualAdjustmentService<S, C> {
    store: Arc<S>,
    catalog: Arc<C>,
}

impl<S: AssignmentStore, C: StructureCatalog> ManualAdjustmentService<S, C> {
    pub fn new(store: Arc<S>, catalog: Arc<C>) -> Self {
        Self { store, catalog }
    }

    /// Exchange the partner slots of two structures and clear both
    /// `random` flags.
    pub fn swap(
        &self,
        id: DistributionId,
        structure_a: StructureId,
        structure_b: StructureId,
    ) -> Result<Distribution> {
        let mut distribution = self.store.load(id)?;
        let mut rows = self.store.load_items(id)?;

        let position = |structure_id: StructureId| {
            rows.iter()
                .position(|a| a.structure_id == structure_id)
                .ok_or(Error::AssignmentNotFound {
                    distribution_id: id,
                    structure_id,
                })
        };
        let ia = position(structure_a)?;
        let ib = position(structure_b)?;

        let slot_a = rows[ia].partner_index;
        rows[ia].partner_index = rows[ib].partner_index;
        rows[ib].partner_index = slot_a;
        rows[ia].random = false;
        rows[ib].random = false;

        distribution.recount(&rows);
        try_validate_distribution(&distribution, &rows)?;
        self.store.replace_items(&distribution, &rows)?;

        info!(
            distribution_id = %id,
            structure_a = %structure_a,
            structure_b = %structure_b,
            "assignments swapped"
        );
        Ok(distribution)
    }

    /// Delete every row whose structure has size category `category`.
    /// Returns the number of rows removed.
    pub fn remove_by_category(&self, id: DistributionId, category: &str) -> Result<usize> {
        self.remove_where(id, "category", category, |s| s.category == category)
    }

    /// Delete every row whose structure lies in `region`.
    /// Returns the number of rows removed.
    pub fn remove_by_region(&self, id: DistributionId, region: &str) -> Result<usize> {
        self.remove_where(id, "region", region, |s| s.region == region)
    }

    fn remove_where(
        &self,
        id: DistributionId,
        dimension: &str,
        value: &str,
        predicate: impl Fn(&Structure) -> bool,
    ) -> Result<usize> {
        let rows = self.store.load_items(id)?;
        let ids: Vec<StructureId> = rows.iter().map(|a| a.structure_id).collect();
        let structures = self.catalog.resolve(&ids).map_err(|missing| {
            warn!(distribution_id = %id, missing = missing.len(), "stale structure references");
            Error::StaleReference(missing)
        })?;

        let doomed: BTreeSet<StructureId> = structures
            .iter()
            .filter(|s| predicate(s))
            .map(|s| s.id)
            .collect();
        let (distribution, removed) = self
            .store
            .delete_items_where(id, &|a: &Assignment| doomed.contains(&a.structure_id))?;

        info!(
            distribution_id = %id,
            dimension,
            value,
            removed,
            total = distribution.total,
            "assignments removed"
        );
        Ok(removed)
    }
}
