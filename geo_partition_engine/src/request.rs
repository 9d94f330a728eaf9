//! Planning requests.
//!
//! A request is pure data: the filtered structure set plus the parameters
//! of one partition run. Validation happens here, before any planning work.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{FilterSnapshot, PlannerConfig, Structure};
use crate::error::PlanError;
use crate::geo::{valid_coordinates, valid_threshold};

/// Everything `generate` needs to produce a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub name: String,
    /// Recorded on the distribution; not re-applied to `structures`.
    #[serde(default)]
    pub filter: FilterSnapshot,
    pub threshold_meters: f64,
    pub partner_names: Vec<String>,
    pub structures: Vec<Structure>,
}

impl PlanRequest {
    /// Build a request by applying `filter` to a catalog slice.
    pub fn from_catalog(
        name: impl Into<String>,
        filter: FilterSnapshot,
        threshold_meters: f64,
        partner_names: Vec<String>,
        catalog: &[Structure],
    ) -> Self {
        let structures = filter.select(catalog);
        Self {
            name: name.into(),
            filter,
            threshold_meters,
            partner_names,
            structures,
        }
    }

    pub fn validate(&self, config: &PlannerConfig) -> Result<(), PlanError> {
        validate_parameters(self.threshold_meters, &self.partner_names, config)?;
        validate_structures(&self.structures)
    }
}

/// Threshold and partner checks shared by generate and redistribute.
pub fn validate_parameters(
    threshold_meters: f64,
    partner_names: &[String],
    config: &PlannerConfig,
) -> Result<(), PlanError> {
    if !valid_threshold(threshold_meters) {
        return Err(PlanError::InvalidThreshold(threshold_meters));
    }
    let min = config.min_partners.max(2);
    if partner_names.len() < min {
        return Err(PlanError::TooFewPartners {
            min,
            got: partner_names.len(),
        });
    }
    Ok(())
}

/// Non-empty, unique ids, usable coordinates.
pub fn validate_structures(structures: &[Structure]) -> Result<(), PlanError> {
    if structures.is_empty() {
        return Err(PlanError::EmptyInput);
    }
    let mut seen = BTreeSet::new();
    for s in structures {
        if !seen.insert(s.id) {
            return Err(PlanError::DuplicateStructure(s.id));
        }
        if !valid_coordinates(s.lat, s.lng) {
            return Err(PlanError::InvalidCoordinates {
                id: s.id,
                lat: s.lat,
                lng: s.lng,
            });
        }
    }
    Ok(())
}
