//! Partition planner.
//!
//! Top-level orchestrator. Validates requests, delegates allocation to the
//! planner and repair modules, binds placements to a distribution and
//! checks the result before handing it out.
//!
//! Every operation without an explicit random source uses a fresh `StdRng`
//! seeded from the configuration, so repeated calls reproduce each other.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::domain::{
    Assignment, AssignmentId, Distribution, DistributionId, PartnerCounts, Placement,
    PlannerConfig, Structure,
};
use crate::error::PlanError;
use crate::invariants::{try_validate_distribution, validate_balance, validate_distribution};
use crate::planner::plan_placements;
use crate::repair;
use crate::request::{validate_parameters, validate_structures, PlanRequest};

/// Stateless planner configured once, reused for every run.
#[derive(Debug, Clone, Default)]
pub struct PartitionPlanner {
    config: PlannerConfig,
}

impl PartitionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Random source for balance repair, seeded from the configuration.
    pub fn seeded_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.config.seed)
    }

    /// Plan a new distribution with id `id`.
    pub fn generate(
        &self,
        id: DistributionId,
        request: &PlanRequest,
        created_at: DateTime<Utc>,
    ) -> Result<(Distribution, Vec<Assignment>), PlanError> {
        self.generate_with_rng(id, request, created_at, &mut self.seeded_rng())
    }

    /// [`generate`](Self::generate) with an injected random source.
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        id: DistributionId,
        request: &PlanRequest,
        created_at: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(Distribution, Vec<Assignment>), PlanError> {
        request.validate(&self.config)?;

        let outcome = plan_placements(
            &request.structures,
            request.threshold_meters,
            request.partner_names.len(),
            rng,
        )?;

        let mut distribution = Distribution {
            id,
            name: request.name.clone(),
            filter: request.filter.clone(),
            threshold_meters: request.threshold_meters,
            partner_names: request.partner_names.clone(),
            partner_counts: PartnerCounts::new(),
            total: 0,
            active: false,
            created_at,
        };
        let assignments = bind(id, &outcome.placements);
        distribution.recount(&assignments);

        validate_distribution(&distribution, &assignments);
        validate_balance(&distribution, &assignments, &request.structures);

        info!(
            distribution_id = %id,
            total = distribution.total,
            categories = outcome.categories,
            clusters = outcome.clusters,
            repaired = outcome.repaired,
            "distribution planned"
        );
        Ok((distribution, assignments))
    }

    /// Re-plan `existing` over `structures` with new parameters.
    ///
    /// Keeps id, name, filter, activation and creation time; replaces
    /// threshold, partner names, counts, total and every row.
    pub fn replan(
        &self,
        existing: &Distribution,
        structures: &[Structure],
        threshold_meters: f64,
        partner_names: Vec<String>,
    ) -> Result<(Distribution, Vec<Assignment>), PlanError> {
        self.replan_with_rng(
            existing,
            structures,
            threshold_meters,
            partner_names,
            &mut self.seeded_rng(),
        )
    }

    /// [`replan`](Self::replan) with an injected random source.
    pub fn replan_with_rng<R: Rng + ?Sized>(
        &self,
        existing: &Distribution,
        structures: &[Structure],
        threshold_meters: f64,
        partner_names: Vec<String>,
        rng: &mut R,
    ) -> Result<(Distribution, Vec<Assignment>), PlanError> {
        validate_parameters(threshold_meters, &partner_names, &self.config)?;
        validate_structures(structures)?;

        let outcome = plan_placements(structures, threshold_meters, partner_names.len(), rng)?;

        let mut distribution = existing.clone();
        distribution.threshold_meters = threshold_meters;
        distribution.partner_names = partner_names;
        let assignments = bind(existing.id, &outcome.placements);
        distribution.recount(&assignments);

        validate_distribution(&distribution, &assignments);
        validate_balance(&distribution, &assignments, structures);

        info!(
            distribution_id = %existing.id,
            total = distribution.total,
            partners = distribution.partner_count(),
            repaired = outcome.repaired,
            "distribution replanned"
        );
        Ok((distribution, assignments))
    }

    /// Restore per-category balance on a stored distribution without
    /// re-clustering. Returns the updated header, rows (same ids) and the
    /// number of rows moved.
    pub fn rebalance(
        &self,
        existing: &Distribution,
        assignments: &[Assignment],
        structures: &[Structure],
    ) -> Result<(Distribution, Vec<Assignment>, usize), PlanError> {
        self.rebalance_with_rng(existing, assignments, structures, &mut self.seeded_rng())
    }

    /// [`rebalance`](Self::rebalance) with an injected random source.
    pub fn rebalance_with_rng<R: Rng + ?Sized>(
        &self,
        existing: &Distribution,
        assignments: &[Assignment],
        structures: &[Structure],
        rng: &mut R,
    ) -> Result<(Distribution, Vec<Assignment>, usize), PlanError> {
        try_validate_distribution(existing, assignments)?;

        let mut placements: Vec<Placement> = assignments.iter().map(Placement::from).collect();
        let moved = repair::rebalance(
            structures,
            &mut placements,
            existing.partner_count(),
            existing.threshold_meters,
            rng,
        )?;

        let rows: Vec<Assignment> = assignments
            .iter()
            .zip(&placements)
            .map(|(a, p)| Assignment {
                partner_index: p.partner_index,
                random: p.random,
                ..a.clone()
            })
            .collect();

        let mut distribution = existing.clone();
        distribution.recount(&rows);

        validate_distribution(&distribution, &rows);
        validate_balance(&distribution, &rows, structures);

        debug!(distribution_id = %existing.id, moved, "distribution rebalanced");
        Ok((distribution, rows, moved))
    }
}

/// Bind placements to a distribution. Row ids run from 1 in placement order.
pub fn bind(distribution_id: DistributionId, placements: &[Placement]) -> Vec<Assignment> {
    placements
        .iter()
        .enumerate()
        .map(|(i, p)| Assignment {
            id: AssignmentId(i as u64 + 1),
            distribution_id,
            structure_id: p.structure_id,
            partner_index: p.partner_index,
            random: p.random,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FilterSnapshot, StructureId};
    use chrono::TimeZone;

    fn at(id: u64, category: &str, lat: f64, lng: f64) -> Structure {
        Structure {
            id: StructureId(id),
            category: category.to_string(),
            region: if id % 2 == 0 { "norte" } else { "sur" }.to_string(),
            locality: "centro".to_string(),
            tag: "billboard".to_string(),
            lat,
            lng,
            excluded: false,
        }
    }

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn request(structures: Vec<Structure>, partners: usize) -> PlanRequest {
        PlanRequest {
            name: "may".to_string(),
            filter: FilterSnapshot::default(),
            threshold_meters: 250.0,
            partner_names: (0..partners).map(|i| format!("Partner {}", i)).collect(),
            structures,
        }
    }

    fn grid(n: u64) -> Vec<Structure> {
        (0..n)
            .map(|i| {
                at(
                    i + 1,
                    if i % 4 == 0 { "4x3" } else { "8x3" },
                    40.0 + (i / 10) as f64 * 0.001,
                    -3.0 + (i % 10) as f64 * 0.001,
                )
            })
            .collect()
    }

    #[test]
    fn generate_builds_consistent_header() {
        let planner = PartitionPlanner::default();
        let (d, rows) = planner
            .generate(DistributionId(7), &request(grid(37), 3), when())
            .unwrap();

        assert_eq!(d.id, DistributionId(7));
        assert!(!d.active);
        assert_eq!(d.total, 37);
        assert_eq!(d.partner_counts.values().sum::<usize>(), 37);
        assert_eq!(rows.len(), 37);
        assert!(rows.iter().all(|a| a.distribution_id == DistributionId(7)));
        assert_eq!(rows.first().map(|a| a.id), Some(AssignmentId(1)));
    }

    #[test]
    fn generate_rejects_empty_input() {
        let planner = PartitionPlanner::default();
        let err = planner
            .generate(DistributionId(1), &request(vec![], 2), when())
            .unwrap_err();
        assert_eq!(err, PlanError::EmptyInput);
    }

    #[test]
    fn generate_is_deterministic() {
        let planner = PartitionPlanner::default();
        let req = request(grid(50), 4);
        let (_, a) = planner.generate(DistributionId(1), &req, when()).unwrap();
        let (_, b) = planner.generate(DistributionId(1), &req, when()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn replan_keeps_identity_and_changes_parameters() {
        let planner = PartitionPlanner::default();
        let structures = grid(30);
        let (mut d, _) = planner
            .generate(DistributionId(3), &request(structures.clone(), 2), when())
            .unwrap();
        d.active = true;

        let partners = vec!["X".to_string(), "Y".to_string(), "Z".to_string()];
        let (r, rows) = planner.replan(&d, &structures, 80.0, partners.clone()).unwrap();

        assert_eq!(r.id, d.id);
        assert_eq!(r.name, d.name);
        assert!(r.active);
        assert_eq!(r.created_at, d.created_at);
        assert_eq!(r.threshold_meters, 80.0);
        assert_eq!(r.partner_names, partners);
        assert_eq!(r.partner_counts.len(), 3);
        assert_eq!(rows.len(), 30);
    }

    #[test]
    fn rebalance_restores_balance_after_region_removal() {
        let planner = PartitionPlanner::default();
        let structures = grid(40);
        let (d, rows) = planner
            .generate(DistributionId(5), &request(structures.clone(), 2), when())
            .unwrap();

        // Drop every row of one partner in the "sur" region.
        let kept: Vec<Assignment> = rows
            .into_iter()
            .filter(|a| !(a.partner_index == 1 && a.structure_id.0 % 2 == 1))
            .collect();
        let mut shrunk = d.clone();
        shrunk.recount(&kept);

        let (fixed, fixed_rows, moved) = planner.rebalance(&shrunk, &kept, &structures).unwrap();
        assert!(moved > 0);
        assert_eq!(fixed.total, kept.len());
        assert_eq!(
            fixed_rows.iter().filter(|a| a.random).count(),
            moved,
            "every moved row is flagged"
        );
        let ids_before: Vec<AssignmentId> = kept.iter().map(|a| a.id).collect();
        let ids_after: Vec<AssignmentId> = fixed_rows.iter().map(|a| a.id).collect();
        assert_eq!(ids_before, ids_after);
    }

    #[test]
    fn rebalance_rejects_inconsistent_input() {
        let planner = PartitionPlanner::default();
        let structures = grid(6);
        let (d, mut rows) = planner
            .generate(DistributionId(5), &request(structures.clone(), 2), when())
            .unwrap();
        rows.pop();
        assert!(matches!(
            planner.rebalance(&d, &rows, &structures),
            Err(PlanError::InvariantViolation(_))
        ));
    }
}
