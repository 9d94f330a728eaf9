//! Planner error type.

use thiserror::Error;

use crate::domain::StructureId;

/// Every way a planning request can be rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// `generate` was called with no structures.
    #[error("cannot plan a distribution from an empty structure set")]
    EmptyInput,

    /// Threshold must be a finite, strictly positive number of meters.
    #[error("proximity threshold must be a positive number of meters, got {0}")]
    InvalidThreshold(f64),

    /// Fewer partner slots than the configured minimum.
    #[error("at least {min} partners are required, got {got}")]
    TooFewPartners { min: usize, got: usize },

    /// The same structure id appears twice in the input.
    #[error("structure {0} appears more than once in the input")]
    DuplicateStructure(StructureId),

    /// Latitude / longitude outside the valid range or not finite.
    #[error("structure {id} has invalid coordinates ({lat}, {lng})")]
    InvalidCoordinates { id: StructureId, lat: f64, lng: f64 },

    /// A loaded or imported distribution breaks a structural invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
