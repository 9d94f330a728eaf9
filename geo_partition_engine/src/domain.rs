//! Core domain types.
//!
//! Pure data plus the small amount of derived arithmetic (count tallies,
//! filter matching) every layer needs to agree on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifiers ────────────────────────────────────────────────────

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// Catalog identifier of a structure.
    StructureId
);
id_type!(
    /// Identifier of a persisted distribution.
    DistributionId
);
id_type!(
    /// Identifier of one assignment row, unique within its distribution.
    AssignmentId
);

// ── Catalog input ──────────────────────────────────────────────────

/// A geo-located advertising structure, as read from the external catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub id: StructureId,
    /// Size category. Balance is enforced per category.
    pub category: String,
    /// Municipality.
    pub region: String,
    /// City.
    pub locality: String,
    /// Advertising type.
    pub tag: String,
    pub lat: f64,
    pub lng: f64,
    /// Excluded structures never reach the planner.
    #[serde(default)]
    pub excluded: bool,
}

/// Selections used to build a distribution's input set.
///
/// An empty set means "no restriction" on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSnapshot {
    pub categories: BTreeSet<String>,
    pub regions: BTreeSet<String>,
    pub localities: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl FilterSnapshot {
    /// Whether `structure` passes every selection and is not excluded.
    pub fn matches(&self, structure: &Structure) -> bool {
        fn admits(set: &BTreeSet<String>, value: &str) -> bool {
            set.is_empty() || set.contains(value)
        }
        !structure.excluded
            && admits(&self.categories, &structure.category)
            && admits(&self.regions, &structure.region)
            && admits(&self.localities, &structure.locality)
            && admits(&self.tags, &structure.tag)
    }

    /// Filter `structures` down to the planner input, preserving order.
    pub fn select(&self, structures: &[Structure]) -> Vec<Structure> {
        structures
            .iter()
            .filter(|s| self.matches(s))
            .cloned()
            .collect()
    }

    /// Activation scope implied by this filter (its category selection).
    pub fn activation_scope(&self) -> ActivationScope {
        ActivationScope {
            categories: self.categories.clone(),
        }
    }
}

/// Key under which at most one distribution may be active.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivationScope {
    pub categories: BTreeSet<String>,
}

impl ActivationScope {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ActivationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.categories.is_empty() {
            return write!(f, "*");
        }
        let joined: Vec<&str> = self.categories.iter().map(String::as_str).collect();
        write!(f, "{}", joined.join(","))
    }
}

// ── Persisted records ──────────────────────────────────────────────

/// Partner slot index → number of assignments in that slot.
pub type PartnerCounts = BTreeMap<usize, usize>;

/// Header of a persisted partition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Distribution {
    pub id: DistributionId,
    pub name: String,
    pub filter: FilterSnapshot,
    pub threshold_meters: f64,
    /// Partner display names; the position is the slot index.
    pub partner_names: Vec<String>,
    pub partner_counts: PartnerCounts,
    pub total: usize,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Distribution {
    pub fn partner_count(&self) -> usize {
        self.partner_names.len()
    }

    pub fn activation_scope(&self) -> ActivationScope {
        self.filter.activation_scope()
    }

    /// Recompute `partner_counts` and `total` from `assignments`.
    pub fn recount(&mut self, assignments: &[Assignment]) {
        self.partner_counts = tally(self.partner_count(), assignments);
        self.total = assignments.len();
    }
}

/// One structure placed in one partner slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Assignment {
    pub id: AssignmentId,
    pub distribution_id: DistributionId,
    pub structure_id: StructureId,
    pub partner_index: usize,
    /// Set when the balance repair moved this item.
    pub random: bool,
}

/// Planner output for a single structure, before it is bound to a
/// distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub structure_id: StructureId,
    pub partner_index: usize,
    pub random: bool,
}

impl From<&Assignment> for Placement {
    fn from(a: &Assignment) -> Self {
        Self {
            structure_id: a.structure_id,
            partner_index: a.partner_index,
            random: a.random,
        }
    }
}

/// Count assignments per slot. Every slot in `0..partner_count` is present,
/// empty slots with zero.
pub fn tally(partner_count: usize, assignments: &[Assignment]) -> PartnerCounts {
    let mut counts: PartnerCounts = (0..partner_count).map(|i| (i, 0)).collect();
    for a in assignments {
        *counts.entry(a.partner_index).or_insert(0) += 1;
    }
    counts
}

// ── Configuration ──────────────────────────────────────────────────

/// Planner tunables, injected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Seed of the balance-repair random source.
    pub seed: u64,
    /// Smallest accepted number of partner slots.
    pub min_partners: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            min_partners: 2,
        }
    }
}
