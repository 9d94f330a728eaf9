//! Balance repair.
//!
//! Moves single placements from the fullest slot to the emptiest one until
//! no two slots of a category differ by more than one. Each move picks the
//! candidate with the fewest proximity neighbours already in the receiving
//! slot; ties are broken by the injected random source. Moved placements are
//! flagged `random`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::Rng;
use tracing::debug;

use crate::domain::{Placement, Structure, StructureId};
use crate::error::PlanError;
use crate::graph::{build_clusters, Clustering};

/// `max - min` over per-slot counts. Zero for no slots.
pub fn spread(counts: &[usize]) -> usize {
    match (counts.iter().max(), counts.iter().min()) {
        (Some(max), Some(min)) => max - min,
        _ => 0,
    }
}

/// Per-slot counts of `placements`; out-of-range slots are ignored.
pub fn slot_counts(placements: &[Placement], partner_count: usize) -> Vec<usize> {
    let mut counts = vec![0usize; partner_count];
    for p in placements {
        if let Some(c) = counts.get_mut(p.partner_index) {
            *c += 1;
        }
    }
    counts
}

/// Repair one category in place. Returns the number of moves made.
pub fn repair_category<R: Rng + ?Sized>(
    placements: &mut [Placement],
    partner_count: usize,
    clustering: &Clustering,
    rng: &mut R,
) -> usize {
    if partner_count < 2 {
        return 0;
    }
    let mut counts = slot_counts(placements, partner_count);
    let position: BTreeMap<StructureId, usize> = placements
        .iter()
        .enumerate()
        .map(|(i, p)| (p.structure_id, i))
        .collect();

    let mut moves = 0;
    loop {
        let (donor, receiver) = extremes(&counts);
        if counts[donor] - counts[receiver] <= 1 {
            break;
        }

        let mut fewest = usize::MAX;
        let mut candidates: Vec<usize> = Vec::new();
        for (i, p) in placements.iter().enumerate() {
            if p.partner_index != donor {
                continue;
            }
            let conflicts = clustering
                .neighbours(p.structure_id)
                .filter_map(|nb| position.get(nb))
                .filter(|&&j| placements[j].partner_index == receiver)
                .count();
            match conflicts.cmp(&fewest) {
                Ordering::Less => {
                    fewest = conflicts;
                    candidates.clear();
                    candidates.push(i);
                }
                Ordering::Equal => candidates.push(i),
                Ordering::Greater => {}
            }
        }
        if candidates.is_empty() {
            break;
        }

        let pick = candidates[rng.gen_range(0..candidates.len())];
        let moved = &mut placements[pick];
        moved.partner_index = receiver;
        moved.random = true;
        counts[donor] -= 1;
        counts[receiver] += 1;
        moves += 1;
        debug!(
            structure_id = %moved.structure_id,
            from = donor,
            to = receiver,
            conflicts = fewest,
            "balance repair move"
        );
    }
    moves
}

/// Repair every category of an existing placement set.
///
/// `structures` must resolve every placement; clustering is rebuilt per
/// category with `threshold_meters` to score conflicts.
pub fn rebalance<R: Rng + ?Sized>(
    structures: &[Structure],
    placements: &mut [Placement],
    partner_count: usize,
    threshold_meters: f64,
    rng: &mut R,
) -> Result<usize, PlanError> {
    let by_id: BTreeMap<StructureId, &Structure> = structures.iter().map(|s| (s.id, s)).collect();

    let mut by_category: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, p) in placements.iter().enumerate() {
        let s = by_id.get(&p.structure_id).ok_or_else(|| {
            PlanError::InvariantViolation(format!(
                "[INVARIANT:structure_refs] placement references unknown structure {}",
                p.structure_id
            ))
        })?;
        by_category.entry(s.category.as_str()).or_default().push(i);
    }

    let mut moves = 0;
    for (category, mut indices) in by_category {
        indices.sort_by_key(|&i| placements[i].structure_id);
        let mut subset: Vec<Placement> = indices.iter().map(|&i| placements[i]).collect();
        if spread(&slot_counts(&subset, partner_count)) <= 1 {
            continue;
        }

        let members: Vec<&Structure> = subset.iter().map(|p| by_id[&p.structure_id]).collect();
        let clustering = build_clusters(&members, threshold_meters)?;
        let moved = repair_category(&mut subset, partner_count, &clustering, rng);
        debug!(category, moved, "category rebalanced");
        moves += moved;

        for (&i, p) in indices.iter().zip(subset) {
            placements[i] = p;
        }
    }
    Ok(moves)
}

/// (lowest-index fullest slot, lowest-index emptiest slot).
fn extremes(counts: &[usize]) -> (usize, usize) {
    let mut donor = 0;
    let mut receiver = 0;
    for (slot, &c) in counts.iter().enumerate() {
        if c > counts[donor] {
            donor = slot;
        }
        if c < counts[receiver] {
            receiver = slot;
        }
    }
    (donor, receiver)
}
