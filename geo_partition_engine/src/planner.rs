//! Partition planning.
//!
//! ALL allocation logic lives here. Each category is planned on its own:
//!
//!   1. sort members by id and cluster them by proximity
//!   2. walk clusters largest first (ties: smallest member id)
//!   3. inside a cluster hand out slots in rounds of `partner_count`; a slot
//!      is used at most once per round, the least loaded free slot wins and
//!      ties go to the slot nearest (cyclically) to the cluster's starting
//!      offset, which advances by one per cluster
//!   4. if the category still ends up uneven, run the balance repair

use std::collections::BTreeMap;

use rand::Rng;
use tracing::debug;

use crate::domain::{Placement, Structure, StructureId};
use crate::error::PlanError;
use crate::graph::build_clusters;
use crate::repair::{repair_category, slot_counts, spread};

/// Result of one planning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Sorted by structure id.
    pub placements: Vec<Placement>,
    pub categories: usize,
    pub clusters: usize,
    /// Placements moved by the balance repair.
    pub repaired: usize,
}

/// Plan placements for `structures` across `partner_count` slots.
///
/// Inputs are assumed validated (non-empty, unique ids, sane coordinates).
pub fn plan_placements<R: Rng + ?Sized>(
    structures: &[Structure],
    threshold_meters: f64,
    partner_count: usize,
    rng: &mut R,
) -> Result<PlanOutcome, PlanError> {
    if structures.is_empty() {
        return Err(PlanError::EmptyInput);
    }

    let mut by_category: BTreeMap<&str, Vec<&Structure>> = BTreeMap::new();
    for s in structures {
        by_category.entry(s.category.as_str()).or_default().push(s);
    }

    let mut outcome = PlanOutcome {
        placements: Vec::with_capacity(structures.len()),
        categories: by_category.len(),
        clusters: 0,
        repaired: 0,
    };

    for (category, members) in by_category {
        let planned = plan_category(&members, threshold_meters, partner_count, rng)?;
        debug!(
            category,
            structures = members.len(),
            clusters = planned.clusters,
            repaired = planned.repaired,
            "category planned"
        );
        outcome.clusters += planned.clusters;
        outcome.repaired += planned.repaired;
        outcome.placements.extend(planned.placements);
    }

    outcome.placements.sort_by_key(|p| p.structure_id);
    Ok(outcome)
}

struct CategoryPlan {
    placements: Vec<Placement>,
    clusters: usize,
    repaired: usize,
}

fn plan_category<R: Rng + ?Sized>(
    members: &[&Structure],
    threshold_meters: f64,
    partner_count: usize,
    rng: &mut R,
) -> Result<CategoryPlan, PlanError> {
    let clustering = build_clusters(members, threshold_meters)?;

    let mut order: Vec<&Vec<StructureId>> = clustering.clusters.iter().collect();
    order.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())));

    let mut counts = vec![0usize; partner_count];
    let mut placements: Vec<Placement> = Vec::with_capacity(members.len());

    for (k, cluster) in order.iter().enumerate() {
        let offset = k % partner_count;
        for round in cluster.chunks(partner_count) {
            let mut free: Vec<usize> = (0..partner_count).collect();
            for &structure_id in round {
                let Some(pos) = free
                    .iter()
                    .enumerate()
                    .min_by_key(|&(_, &slot)| {
                        (counts[slot], (slot + partner_count - offset) % partner_count)
                    })
                    .map(|(pos, _)| pos)
                else {
                    break;
                };
                let slot = free.swap_remove(pos);
                counts[slot] += 1;
                placements.push(Placement {
                    structure_id,
                    partner_index: slot,
                    random: false,
                });
            }
        }
    }

    placements.sort_by_key(|p| p.structure_id);

    let mut repaired = 0;
    if spread(&slot_counts(&placements, partner_count)) > 1 {
        repaired = repair_category(&mut placements, partner_count, &clustering, rng);
    }

    Ok(CategoryPlan {
        placements,
        clusters: clustering.clusters.len(),
        repaired,
    })
}
