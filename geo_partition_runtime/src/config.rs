//! Runtime configuration.
//!
//! JSON file, every field optional:
//!
//! ```json
//! {
//!   "store_path": "data/distributions.store",
//!   "default_threshold_meters": 150.0,
//!   "planner": { "seed": 42, "min_partners": 2 }
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use geo_partition_engine::PlannerConfig;

use crate::error::Result;
use crate::file_store::FileStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Location of the file-backed assignment store.
    pub store_path: PathBuf,
    /// Threshold used when a catalog-driven generate call gives none.
    pub default_threshold_meters: f64,
    pub planner: PlannerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("distributions.store"),
            default_threshold_meters: 200.0,
            planner: PlannerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let config: Self = serde_json::from_str(&text)?;
                debug!(path = %path.display(), "runtime config loaded");
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no runtime config, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open the file store at `store_path`.
    pub fn open_store(&self) -> Result<FileStore> {
        Ok(FileStore::open(&self.store_path)?)
    }
}
