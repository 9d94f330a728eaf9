//! Invariant checks.
//!
//! `try_*` functions return `PlanError::InvariantViolation` and are used on
//! data loaded from storage or imported from files. `validate_*` wrappers
//! panic and are used by the planner on its own freshly built output, where
//! a failure is a bug.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    tally, ActivationScope, Assignment, Distribution, DistributionId, Structure, StructureId,
};
use crate::error::PlanError;
use crate::repair::spread;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Header/row consistency: ownership, slot range, unique rows, counts.
pub fn try_validate_distribution(
    distribution: &Distribution,
    assignments: &[Assignment],
) -> Result<(), PlanError> {
    check_ownership(distribution, assignments)?;
    check_slot_range(distribution, assignments)?;
    check_unique_rows(assignments)?;
    check_counts(distribution, assignments)?;
    Ok(())
}

/// Per-category spread of at most one.
pub fn try_validate_balance(
    distribution: &Distribution,
    assignments: &[Assignment],
    structures: &[Structure],
) -> Result<(), PlanError> {
    let category_of: BTreeMap<StructureId, &str> = structures
        .iter()
        .map(|s| (s.id, s.category.as_str()))
        .collect();

    let n = distribution.partner_count();
    let mut per_category: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for a in assignments {
        let category = category_of.get(&a.structure_id).ok_or_else(|| {
            violation(
                "structure_refs",
                format!("assignment references unknown structure {}", a.structure_id),
            )
        })?;
        let counts = per_category
            .entry(category)
            .or_insert_with(|| vec![0; n]);
        if let Some(c) = counts.get_mut(a.partner_index) {
            *c += 1;
        }
    }

    for (category, counts) in per_category {
        if spread(&counts) > 1 {
            return Err(violation(
                "category_balance",
                format!("category {:?} is unbalanced: {:?}", category, counts),
            ));
        }
    }
    Ok(())
}

/// At most one active distribution per activation scope.
pub fn try_validate_activation(distributions: &[Distribution]) -> Result<(), PlanError> {
    let mut active: BTreeMap<ActivationScope, DistributionId> = BTreeMap::new();
    for d in distributions.iter().filter(|d| d.active) {
        if let Some(other) = active.insert(d.activation_scope(), d.id) {
            return Err(violation(
                "single_active",
                format!(
                    "distributions {} and {} are both active in scope {}",
                    other,
                    d.id,
                    d.activation_scope()
                ),
            ));
        }
    }
    Ok(())
}

/// Panicking variant of [`try_validate_distribution`].
pub fn validate_distribution(distribution: &Distribution, assignments: &[Assignment]) {
    if let Err(e) = try_validate_distribution(distribution, assignments) {
        panic!("{}", e);
    }
}

/// Panicking variant of [`try_validate_balance`].
pub fn validate_balance(
    distribution: &Distribution,
    assignments: &[Assignment],
    structures: &[Structure],
) {
    if let Err(e) = try_validate_balance(distribution, assignments, structures) {
        panic!("{}", e);
    }
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn violation(tag: &str, detail: String) -> PlanError {
    PlanError::InvariantViolation(format!("[INVARIANT:{}] {}", tag, detail))
}

fn check_ownership(distribution: &Distribution, assignments: &[Assignment]) -> Result<(), PlanError> {
    for a in assignments {
        if a.distribution_id != distribution.id {
            return Err(violation(
                "ownership",
                format!(
                    "assignment {} belongs to distribution {}, not {}",
                    a.id, a.distribution_id, distribution.id
                ),
            ));
        }
    }
    Ok(())
}

fn check_slot_range(distribution: &Distribution, assignments: &[Assignment]) -> Result<(), PlanError> {
    let n = distribution.partner_count();
    for a in assignments {
        if a.partner_index >= n {
            return Err(violation(
                "slot_range",
                format!(
                    "structure {} placed in slot {} but only {} partners exist",
                    a.structure_id, a.partner_index, n
                ),
            ));
        }
    }
    Ok(())
}

fn check_unique_rows(assignments: &[Assignment]) -> Result<(), PlanError> {
    let mut ids = BTreeSet::new();
    let mut structures = BTreeSet::new();
    for a in assignments {
        if !ids.insert(a.id) {
            return Err(violation("unique_rows", format!("assignment id {} repeated", a.id)));
        }
        if !structures.insert(a.structure_id) {
            return Err(violation(
                "unique_rows",
                format!("structure {} assigned twice", a.structure_id),
            ));
        }
    }
    Ok(())
}

fn check_counts(distribution: &Distribution, assignments: &[Assignment]) -> Result<(), PlanError> {
    let expected = tally(distribution.partner_count(), assignments);
    let sum: usize = distribution.partner_counts.values().sum();
    if distribution.partner_counts != expected
        || sum != distribution.total
        || distribution.total != assignments.len()
    {
        return Err(violation(
            "count_consistency",
            format!(
                "header says {:?} / total {}, rows give {:?} / {}",
                distribution.partner_counts,
                distribution.total,
                expected,
                assignments.len()
            ),
        ));
    }
    Ok(())
}
