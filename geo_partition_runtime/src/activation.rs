//! Activation — at most one active distribution per scope.
//!
//! A distribution's scope is the category selection of its filter
//! snapshot. Callers pass the scope they mean to activate explicitly; it
//! must match the target's own.

use std::sync::Arc;

use tracing::info;

use geo_partition_engine::invariants::try_validate_activation;
use geo_partition_engine::{ActivationScope, Distribution, DistributionId};

use crate::error::{Error, Result};
use crate::store::AssignmentStore;

pub struct ActivationManager<S> {
    store: Arc<S>,
}

impl<S: AssignmentStore> ActivationManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Activate `id` within `scope`, deactivating every other distribution
    /// of that scope in the same store write.
    pub fn set_active(&self, id: DistributionId, scope: &ActivationScope) -> Result<Distribution> {
        let target = self.store.load(id)?;
        let actual = target.activation_scope();
        if actual != *scope {
            return Err(Error::ScopeMismatch {
                id,
                requested: scope.clone(),
                actual,
            });
        }

        let mut in_scope: Vec<Distribution> = self
            .store
            .list()?
            .into_iter()
            .filter(|d| d.activation_scope() == *scope)
            .collect();
        let mut flags: Vec<(DistributionId, bool)> = Vec::new();
        for d in in_scope.iter_mut() {
            let wanted = d.id == id;
            if wanted || d.active {
                flags.push((d.id, wanted));
            }
            d.active = wanted;
        }
        let deactivated = flags.iter().filter(|(_, on)| !on).count();

        // Checked on the projected scope, before the write.
        try_validate_activation(&in_scope)?;
        self.store.set_active_flags(&flags)?;

        info!(distribution_id = %id, scope = %scope, deactivated, "distribution activated");
        Ok(Distribution {
            active: true,
            ..target
        })
    }

    /// Clear the `active` flag of `id`.
    pub fn deactivate(&self, id: DistributionId) -> Result<Distribution> {
        let target = self.store.load(id)?;
        self.store.set_active_flags(&[(id, false)])?;
        info!(distribution_id = %id, "distribution deactivated");
        Ok(Distribution {
            active: false,
            ..target
        })
    }

    /// The active distribution of `scope`, if any.
    pub fn active_for(&self, scope: &ActivationScope) -> Result<Option<Distribution>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .find(|d| d.active && d.activation_scope() == *scope))
    }
}
