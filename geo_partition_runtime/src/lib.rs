#![forbid(unsafe_code)]

//! Geo partition runtime.
//!
//! Wraps the planning kernel with persistence, manual adjustments,
//! activation, export and drift detection.
//!
//! No planning logic lives here — clustering, assignment, repair and
//! invariants are delegated to `geo_partition_engine`.

pub mod activation;
pub mod adjustments;
pub mod catalog;
pub mod config;
pub mod distributions;
pub mod drift;
pub mod error;
pub mod export;
pub mod file_store;
pub mod legacy;
pub mod memory_store;
pub mod proto_bridge;
pub mod proto_types;
pub mod store;

pub use activation::ActivationManager;
pub use adjustments::ManualAdjustmentService;
pub use catalog::{InMemoryCatalog, StructureCatalog};
pub use config::RuntimeConfig;
pub use distributions::DistributionService;
pub use error::{Error, Result};
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use store::{AssignmentStore, StoreError};
