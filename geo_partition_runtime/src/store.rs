//! Assignment store contract.
//!
//! A store holds distribution headers together with their assignment rows.
//! Every mutating call is all-or-nothing: on error the stored state is
//! exactly what it was before the call.
//!
//! `StoreTables` is the in-memory table shape shared by the memory and
//! file-backed implementations. Its mutators check every precondition
//! before touching anything, so a failed call leaves the tables intact.

use std::collections::BTreeMap;
use std::io;

use thiserror::Error;

use geo_partition_engine::{Assignment, Distribution, DistributionId};

/// Failures of the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("store is corrupt: {0}")]
    Corrupt(String),
    #[error("distribution {0} not found")]
    NotFound(DistributionId),
    #[error("distribution {0} already exists")]
    AlreadyExists(DistributionId),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence of distributions and their assignment rows.
pub trait AssignmentStore {
    /// Reserve a fresh distribution id. Ids are never handed out twice.
    fn next_distribution_id(&self) -> Result<DistributionId, StoreError>;

    /// Insert a new distribution with all of its rows.
    fn save_new(
        &self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError>;

    fn load(&self, id: DistributionId) -> Result<Distribution, StoreError>;

    /// Rows of `id` in row-id order.
    fn load_items(&self, id: DistributionId) -> Result<Vec<Assignment>, StoreError>;

    /// Every header, in id order.
    fn list(&self) -> Result<Vec<Distribution>, StoreError>;

    /// Replace the header and every row of an existing distribution.
    fn replace_items(
        &self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError>;

    /// Remove the header and all rows.
    fn delete_distribution(&self, id: DistributionId) -> Result<(), StoreError>;

    /// Remove the rows matching `predicate`, recompute counts and total.
    /// Returns the updated header and the number of rows removed. The
    /// header stays even when no rows remain.
    fn delete_items_where(
        &self,
        id: DistributionId,
        predicate: &dyn Fn(&Assignment) -> bool,
    ) -> Result<(Distribution, usize), StoreError>;

    /// Set the `active` flag on several distributions at once.
    fn set_active_flags(&self, flags: &[(DistributionId, bool)]) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Shared table state
// ---------------------------------------------------------------------------

/// A distribution header and its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDistribution {
    pub distribution: Distribution,
    pub assignments: Vec<Assignment>,
}

/// Tables behind both store implementations.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreTables {
    pub next_id: u64,
    pub records: BTreeMap<DistributionId, StoredDistribution>,
}

impl Default for StoreTables {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
        }
    }
}

impl StoreTables {
    pub fn allocate_id(&mut self) -> DistributionId {
        let id = DistributionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(
        &mut self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError> {
        if self.records.contains_key(&distribution.id) {
            return Err(StoreError::AlreadyExists(distribution.id));
        }
        self.next_id = self.next_id.max(distribution.id.0 + 1);
        self.records.insert(
            distribution.id,
            StoredDistribution {
                distribution: distribution.clone(),
                assignments: sorted_rows(assignments),
            },
        );
        Ok(())
    }

    pub fn get(&self, id: DistributionId) -> Result<&StoredDistribution, StoreError> {
        self.records.get(&id).ok_or(StoreError::NotFound(id))
    }

    pub fn headers(&self) -> Vec<Distribution> {
        self.records
            .values()
            .map(|r| r.distribution.clone())
            .collect()
    }

    pub fn replace(
        &mut self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(&distribution.id)
            .ok_or(StoreError::NotFound(distribution.id))?;
        record.distribution = distribution.clone();
        record.assignments = sorted_rows(assignments);
        Ok(())
    }

    pub fn remove(&mut self, id: DistributionId) -> Result<(), StoreError> {
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    pub fn remove_items_where(
        &mut self,
        id: DistributionId,
        predicate: &dyn Fn(&Assignment) -> bool,
    ) -> Result<(Distribution, usize), StoreError> {
        let record = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let before = record.assignments.len();
        record.assignments.retain(|a| !predicate(a));
        let removed = before - record.assignments.len();
        record.distribution.recount(&record.assignments);
        Ok((record.distribution.clone(), removed))
    }

    pub fn apply_active_flags(&mut self, flags: &[(DistributionId, bool)]) -> Result<(), StoreError> {
        if let Some((missing, _)) = flags.iter().find(|(id, _)| !self.records.contains_key(id)) {
            return Err(StoreError::NotFound(*missing));
        }
        for (id, active) in flags {
            if let Some(record) = self.records.get_mut(id) {
                record.distribution.active = *active;
            }
        }
        Ok(())
    }
}

fn sorted_rows(assignments: &[Assignment]) -> Vec<Assignment> {
    let mut rows = assignments.to_vec();
    rows.sort_by_key(|a| a.id);
    rows
}
