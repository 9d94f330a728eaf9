//! Distribution lifecycle — generate, redistribute, rebalance, delete.
//!
//! Order for every mutation:
//!   1. load and resolve everything the planner needs
//!   2. plan (pure; may fail)
//!   3. one atomic store write, only if step 2 succeeded

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use geo_partition_engine::{
    Assignment, AssignmentId, Distribution, DistributionId, FilterSnapshot, PartitionPlanner,
    PlanRequest, PlannerConfig, Structure, StructureId,
};

use crate::catalog::StructureCatalog;
use crate::config::RuntimeConfig;
use crate::drift::compare_assignments;
use crate::error::{Error, Result};
use crate::export::{export_distribution_to_file, import_distribution_from_file};
use crate::store::AssignmentStore;

pub struct DistributionService<S, C> {
    store: Arc<S>,
    catalog: Arc<C>,
    planner: PartitionPlanner,
    default_threshold_meters: f64,
}

impl<S: AssignmentStore, C: StructureCatalog> DistributionService<S, C> {
    pub fn new(store: Arc<S>, catalog: Arc<C>, planner: PlannerConfig) -> Self {
        Self {
            store,
            catalog,
            planner: PartitionPlanner::new(planner),
            default_threshold_meters: RuntimeConfig::default().default_threshold_meters,
        }
    }

    pub fn from_config(config: &RuntimeConfig, store: Arc<S>, catalog: Arc<C>) -> Self {
        Self {
            default_threshold_meters: config.default_threshold_meters,
            ..Self::new(store, catalog, config.planner.clone())
        }
    }

    pub fn planner(&self) -> &PartitionPlanner {
        &self.planner
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Plan `request` and persist it as a new, inactive distribution.
    pub fn generate(&self, request: &PlanRequest) -> Result<Distribution> {
        request.validate(self.planner.config())?;
        let id = self.store.next_distribution_id()?;
        let (distribution, assignments) = self.planner.generate(id, request, Utc::now())?;
        self.store.save_new(&distribution, &assignments)?;

        info!(
            distribution_id = %id,
            name = %distribution.name,
            total = distribution.total,
            partners = distribution.partner_count(),
            "distribution generated"
        );
        Ok(distribution)
    }

    /// Select structures from the catalog with `filter`, then [`generate`](Self::generate).
    /// Without a threshold the configured default applies.
    pub fn generate_from_catalog(
        &self,
        name: &str,
        filter: FilterSnapshot,
        threshold_meters: Option<f64>,
        partner_names: Vec<String>,
    ) -> Result<Distribution> {
        let request = PlanRequest::from_catalog(
            name,
            filter,
            threshold_meters.unwrap_or(self.default_threshold_meters),
            partner_names,
            &self.catalog.all(),
        );
        debug!(name, selected = request.structures.len(), "catalog selection");
        self.generate(&request)
    }

    /// Re-plan the structures already attached to `id` with new parameters
    /// and replace every row. Id, name, filter, activation and creation
    /// time are kept.
    pub fn redistribute(
        &self,
        id: DistributionId,
        threshold_meters: f64,
        partner_names: Vec<String>,
    ) -> Result<Distribution> {
        let existing = self.store.load(id)?;
        let before = self.store.load_items(id)?;
        let structures = self.resolve(id, &before)?;

        let (distribution, after) =
            self.planner
                .replan(&existing, &structures, threshold_meters, partner_names)?;
        self.store.replace_items(&distribution, &after)?;

        let drift = compare_assignments(&before, &after);
        info!(
            distribution_id = %id,
            total = distribution.total,
            partners = distribution.partner_count(),
            moved = drift.moved.len(),
            "distribution redistributed"
        );
        Ok(distribution)
    }

    /// Restore per-category balance without re-clustering. Returns the
    /// header and the number of rows moved; nothing is written when no
    /// row moves.
    pub fn rebalance(&self, id: DistributionId) -> Result<(Distribution, usize)> {
        let existing = self.store.load(id)?;
        let before = self.store.load_items(id)?;
        let structures = self.resolve(id, &before)?;

        let (distribution, after, moved) = self.planner.rebalance(&existing, &before, &structures)?;
        if moved == 0 {
            debug!(distribution_id = %id, "already balanced");
            return Ok((existing, 0));
        }
        self.store.replace_items(&distribution, &after)?;

        let drift = compare_assignments(&before, &after);
        info!(
            distribution_id = %id,
            moved,
            deltas = ?drift.count_deltas,
            "distribution rebalanced"
        );
        Ok((distribution, moved))
    }

    /// Remove the header and every row.
    pub fn delete(&self, id: DistributionId) -> Result<()> {
        self.store.delete_distribution(id)?;
        info!(distribution_id = %id, "distribution deleted");
        Ok(())
    }

    /// Write `id` to an export file.
    pub fn export(&self, id: DistributionId, path: &Path) -> Result<()> {
        let distribution = self.store.load(id)?;
        let rows = self.store.load_items(id)?;
        export_distribution_to_file(&distribution, &rows, path)?;
        info!(distribution_id = %id, path = %path.display(), "distribution exported");
        Ok(())
    }

    /// Store a validated export file as a new, inactive distribution under
    /// a fresh id. Row ids restart from 1.
    pub fn import(&self, path: &Path) -> Result<Distribution> {
        let (imported, rows) = import_distribution_from_file(path)?;
        let id = self.store.next_distribution_id()?;
        let distribution = Distribution {
            id,
            active: false,
            ..imported
        };
        let rows: Vec<Assignment> = rows
            .into_iter()
            .enumerate()
            .map(|(i, a)| Assignment {
                id: AssignmentId(i as u64 + 1),
                distribution_id: id,
                ..a
            })
            .collect();
        self.store.save_new(&distribution, &rows)?;
        info!(
            distribution_id = %id,
            name = %distribution.name,
            total = distribution.total,
            "distribution imported"
        );
        Ok(distribution)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get(&self, id: DistributionId) -> Result<Distribution> {
        Ok(self.store.load(id)?)
    }

    pub fn list(&self) -> Result<Vec<Distribution>> {
        Ok(self.store.list()?)
    }

    pub fn items(&self, id: DistributionId) -> Result<Vec<Assignment>> {
        Ok(self.store.load_items(id)?)
    }

    fn resolve(&self, id: DistributionId, rows: &[Assignment]) -> Result<Vec<Structure>> {
        let ids: Vec<StructureId> = rows.iter().map(|a| a.structure_id).collect();
        self.catalog.resolve(&ids).map_err(|missing| {
            warn!(distribution_id = %id, missing = missing.len(), "stale structure references");
            Error::StaleReference(missing)
        })
    }
}
