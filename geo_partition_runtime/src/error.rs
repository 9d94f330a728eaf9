//! Runtime error type.

use thiserror::Error;

use geo_partition_engine::{ActivationScope, DistributionId, PlanError, StructureId};

use crate::export::ExportError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected or failed planning (includes empty input).
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("distribution {0} not found")]
    DistributionNotFound(DistributionId),

    #[error("structure {structure_id} has no assignment in distribution {distribution_id}")]
    AssignmentNotFound {
        distribution_id: DistributionId,
        structure_id: StructureId,
    },

    /// Structures referenced by a distribution that the catalog no longer has.
    #[error("structures no longer resolve in the catalog: {0:?}")]
    StaleReference(Vec<StructureId>),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("scope {requested} does not match distribution {id} scope {actual}")]
    ScopeMismatch {
        id: DistributionId,
        requested: ActivationScope,
        actual: ActivationScope,
    },

    /// Legacy two-partner fields requested for a distribution with a
    /// different number of partners.
    #[error("legacy partner fields need exactly 2 partners, distribution has {0}")]
    LegacyShape(usize),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Error::DistributionNotFound(id),
            other => Error::StoreUnavailable(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
