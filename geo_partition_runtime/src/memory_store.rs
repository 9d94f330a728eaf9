//! In-memory assignment store.
//!
//! Cloneable handle over shared tables; clones see the same data. Used by
//! tests and by callers that persist elsewhere.

use std::sync::{Arc, Mutex, MutexGuard};

use geo_partition_engine::{Assignment, Distribution, DistributionId};

use crate::store::{AssignmentStore, StoreError, StoreTables};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, StoreTables>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl AssignmentStore for MemoryStore {
    fn next_distribution_id(&self) -> Result<DistributionId, StoreError> {
        Ok(self.tables()?.allocate_id())
    }

    fn save_new(
        &self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError> {
        self.tables()?.insert(distribution, assignments)
    }

    fn load(&self, id: DistributionId) -> Result<Distribution, StoreError> {
        Ok(self.tables()?.get(id)?.distribution.clone())
    }

    fn load_items(&self, id: DistributionId) -> Result<Vec<Assignment>, StoreError> {
        Ok(self.tables()?.get(id)?.assignments.clone())
    }

    fn list(&self) -> Result<Vec<Distribution>, StoreError> {
        Ok(self.tables()?.headers())
    }

    fn replace_items(
        &self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError> {
        self.tables()?.replace(distribution, assignments)
    }

    fn delete_distribution(&self, id: DistributionId) -> Result<(), StoreError> {
        self.tables()?.remove(id)
    }

    fn delete_items_where(
        &self,
        id: DistributionId,
        predicate: &dyn Fn(&Assignment) -> bool,
    ) -> Result<(Distribution, usize), StoreError> {
        self.tables()?.remove_items_where(id, predicate)
    }

    fn set_active_flags(&self, flags: &[(DistributionId, bool)]) -> Result<(), StoreError> {
        self.tables()?.apply_active_flags(flags)
    }
}
