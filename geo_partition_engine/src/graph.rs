//! Proximity graph utilities.
//!
//! Pure functions of `(structures, threshold)`. Adjacency comes from the
//! grid index; connected components come from a disjoint-set forest.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Structure, StructureId};
use crate::error::PlanError;
use crate::spatial::DistanceIndex;

// ---------------------------------------------------------------------------
// Disjoint set
// ---------------------------------------------------------------------------

/// Union-find over `0..n` with union by rank and path halving.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge the sets of `a` and `b`. Returns false if already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Proximity clusters of one structure set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clustering {
    /// Members sorted ascending; clusters ordered by their smallest member.
    pub clusters: Vec<Vec<StructureId>>,
    /// Direct neighbours (within threshold) of every structure.
    pub adjacency: BTreeMap<StructureId, BTreeSet<StructureId>>,
}

impl Clustering {
    pub fn neighbours(&self, id: StructureId) -> impl Iterator<Item = &StructureId> {
        self.adjacency.get(&id).into_iter().flatten()
    }

    /// Position in `clusters` of the cluster holding `id`.
    pub fn cluster_of(&self, id: StructureId) -> Option<usize> {
        self.clusters.iter().position(|c| c.binary_search(&id).is_ok())
    }
}

/// Connected components of the "within `threshold_meters`" relation.
pub fn build_clusters(
    structures: &[&Structure],
    threshold_meters: f64,
) -> Result<Clustering, PlanError> {
    let mut sorted: Vec<&Structure> = structures.to_vec();
    sorted.sort_by_key(|s| s.id);

    let index = DistanceIndex::build(sorted.iter().copied(), threshold_meters)?;
    let position: BTreeMap<StructureId, usize> =
        sorted.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

    let mut sets = DisjointSet::new(sorted.len());
    let mut adjacency = BTreeMap::new();
    for (i, s) in sorted.iter().enumerate() {
        let near = index.neighbors(s.id, threshold_meters);
        for other in &near {
            if let Some(&j) = position.get(other) {
                sets.union(i, j);
            }
        }
        adjacency.insert(s.id, near);
    }

    // Roots are visited in ascending member order, so cluster order is by
    // smallest member and members stay sorted.
    let mut slot_of_root: BTreeMap<usize, usize> = BTreeMap::new();
    let mut clusters: Vec<Vec<StructureId>> = Vec::new();
    for (i, s) in sorted.iter().enumerate() {
        let root = sets.find(i);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(s.id);
    }

    Ok(Clustering {
        clusters,
        adjacency,
    })
}
