//! Drift detection — determinism verification and assignment comparison.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use geo_partition_engine::domain::Placement;
use geo_partition_engine::hashing::canonical_hash;
use geo_partition_engine::{
    Assignment, DistributionId, PartitionPlanner, PlanError, PlanRequest, StructureId,
};

/// Plan `request` twice and assert identical canonical hashes. Panics on
/// a mismatch; returns the hash otherwise.
pub fn verify_determinism(
    planner: &PartitionPlanner,
    request: &PlanRequest,
) -> Result<String, PlanError> {
    let epoch = DateTime::<Utc>::default();
    let hash = |run: u8| -> Result<String, PlanError> {
        let (d, rows) = planner.generate(DistributionId(u64::from(run)), request, epoch)?;
        let placements: Vec<Placement> = rows.iter().map(Placement::from).collect();
        Ok(canonical_hash(&d.partner_names, &placements))
    };
    let hash1 = hash(1)?;
    let hash2 = hash(2)?;

    if hash1 != hash2 {
        panic!(
            "DETERMINISM FAILURE: two plans produced different hashes.\n\
             Run 1: {}\n\
             Run 2: {}",
            hash1, hash2
        );
    }
    Ok(hash1)
}

/// A structure whose partner slot changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub structure_id: StructureId,
    pub from: usize,
    pub to: usize,
}

/// Structured comparison of two assignment sets, keyed by structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub moved: Vec<Move>,
    pub added: Vec<StructureId>,
    pub removed: Vec<StructureId>,
    /// Per partner slot: count after minus count before.
    pub count_deltas: BTreeMap<usize, i64>,
    pub random_before: usize,
    pub random_after: usize,
}

impl DriftReport {
    /// No structure moved, appeared or disappeared.
    pub fn is_unchanged(&self) -> bool {
        self.moved.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare two assignment sets of the same distribution (or of two
/// distributions over the same structures).
pub fn compare_assignments(before: &[Assignment], after: &[Assignment]) -> DriftReport {
    let slots_before: BTreeMap<StructureId, usize> = before
        .iter()
        .map(|a| (a.structure_id, a.partner_index))
        .collect();
    let slots_after: BTreeMap<StructureId, usize> = after
        .iter()
        .map(|a| (a.structure_id, a.partner_index))
        .collect();

    let mut report = DriftReport {
        random_before: before.iter().filter(|a| a.random).count(),
        random_after: after.iter().filter(|a| a.random).count(),
        ..Default::default()
    };

    for (&id, &from) in &slots_before {
        match slots_after.get(&id) {
            Some(&to) if to != from => report.moved.push(Move {
                structure_id: id,
                from,
                to,
            }),
            Some(_) => {}
            None => report.removed.push(id),
        }
    }
    report.added = slots_after
        .keys()
        .filter(|id| !slots_before.contains_key(id))
        .copied()
        .collect();

    for &slot in slots_before.values() {
        *report.count_deltas.entry(slot).or_insert(0) -= 1;
    }
    for &slot in slots_after.values() {
        *report.count_deltas.entry(slot).or_insert(0) += 1;
    }
    report.count_deltas.retain(|_, delta| *delta != 0);

    report
}
