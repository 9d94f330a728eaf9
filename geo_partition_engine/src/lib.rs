#![forbid(unsafe_code)]

//! Balanced geo-aware partition engine.
//!
//! Splits geo-located structures across N partners so every partner gets a
//! near-equal share of each size category and neighbouring structures go to
//! different partners where possible. Pure and synchronous; persistence
//! lives in `geo_partition_runtime`.

/// Version of the planning rules. Part of every canonical hash.
pub const ENGINE_VERSION: u32 = 1;

pub mod domain;
pub mod engine;
pub mod error;
pub mod geo;
pub mod graph;
pub mod hashing;
pub mod invariants;
pub mod planner;
pub mod repair;
pub mod request;
pub mod spatial;

pub use domain::{
    ActivationScope, Assignment, AssignmentId, Distribution, DistributionId, FilterSnapshot,
    PartnerCounts, Placement, PlannerConfig, Structure, StructureId,
};
pub use engine::PartitionPlanner;
pub use error::PlanError;
pub use request::PlanRequest;
pub use spatial::DistanceIndex;
