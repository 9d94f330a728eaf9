//! Export codec — distribution + assignments as JSON for read-only consumers.
//!
//! Pure codec layer plus file I/O.
//!
//! - `encode_export`:  distribution + rows → JSON string
//! - `decode_export`:  JSON string → export document (strict, no defaults)
//! - `restore_export`: decode + integrity hash + invariant validation
//! - `export_distribution_to_file` / `import_distribution_from_file`: file I/O
//! - `export_hash`:    SHA-256 of the encoded document (lowercase hex)
//!
//! Two-partner distributions also carry the legacy `partner_a`/`partner_b`
//! fields; on import they must agree with the indexed ones.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use geo_partition_engine::domain::Placement;
use geo_partition_engine::hashing::canonical_hash;
use geo_partition_engine::invariants::try_validate_distribution;
use geo_partition_engine::{Assignment, Distribution};

use crate::legacy::LegacyPartnerFields;

pub const EXPORT_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Malformed JSON, missing fields or unknown fields.
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("unsupported export format version {0}")]
    UnsupportedVersion(u32),
    /// Recorded assignment hash does not match the rows.
    #[error("integrity check failed: recorded {recorded}, computed {computed}")]
    Integrity { recorded: String, computed: String },
    #[error("legacy partner fields disagree with partner names and counts")]
    LegacyMismatch,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("export i/o error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionExport {
    pub format_version: u32,
    pub distribution: Distribution,
    pub assignments: Vec<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyPartnerFields>,
    /// Canonical hash of partner names and placements.
    pub assignments_hash: String,
}

impl DistributionExport {
    pub fn new(distribution: &Distribution, assignments: &[Assignment]) -> Self {
        let mut rows = assignments.to_vec();
        rows.sort_by_key(|a| a.id);
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            legacy: LegacyPartnerFields::from_distribution(distribution).ok(),
            assignments_hash: assignments_hash(distribution, &rows),
            distribution: distribution.clone(),
            assignments: rows,
        }
    }
}

fn assignments_hash(distribution: &Distribution, assignments: &[Assignment]) -> String {
    let placements: Vec<Placement> = assignments.iter().map(Placement::from).collect();
    canonical_hash(&distribution.partner_names, &placements)
}

// ---------------------------------------------------------------------------
// Encoder / decoder
// ---------------------------------------------------------------------------

/// Encode to a compact JSON string. Rows are ordered by id, so identical
/// inputs encode byte-for-byte identically.
pub fn encode_export(
    distribution: &Distribution,
    assignments: &[Assignment],
) -> Result<String, ExportError> {
    serde_json::to_string(&DistributionExport::new(distribution, assignments))
        .map_err(|e| ExportError::Serialization(e.to_string()))
}

/// Strict decode without any validation. Use [`restore_export`] for
/// validated loading.
pub fn decode_export(json: &str) -> Result<DistributionExport, ExportError> {
    serde_json::from_str(json).map_err(|e| ExportError::Deserialization(e.to_string()))
}

/// Decode and validate: format version, assignment hash, legacy fields and
/// header/row consistency.
pub fn restore_export(json: &str) -> Result<(Distribution, Vec<Assignment>), ExportError> {
    let doc = decode_export(json)?;
    if doc.format_version != EXPORT_FORMAT_VERSION {
        return Err(ExportError::UnsupportedVersion(doc.format_version));
    }

    let computed = assignments_hash(&doc.distribution, &doc.assignments);
    if computed != doc.assignments_hash {
        return Err(ExportError::Integrity {
            recorded: doc.assignments_hash,
            computed,
        });
    }

    if let Some(legacy) = &doc.legacy {
        if !legacy.describes(&doc.distribution) {
            return Err(ExportError::LegacyMismatch);
        }
    }

    try_validate_distribution(&doc.distribution, &doc.assignments)
        .map_err(|e| ExportError::InvariantViolation(e.to_string()))?;
    Ok((doc.distribution, doc.assignments))
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Write the export to `path`, creating parent directories if needed.
pub fn export_distribution_to_file(
    distribution: &Distribution,
    assignments: &[Assignment],
    path: &Path,
) -> Result<(), ExportError> {
    let json = encode_export(distribution, assignments)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json.as_bytes())?;
    Ok(())
}

/// Read and validate an export file.
pub fn import_distribution_from_file(
    path: &Path,
) -> Result<(Distribution, Vec<Assignment>), ExportError> {
    let content = fs::read_to_string(path)?;
    restore_export(&content)
}

/// SHA-256 of the encoded document. Lowercase hex string.
///
/// Covers the whole document, header included, unlike the embedded
/// `assignments_hash` which only covers partners and placements.
pub fn export_hash(
    distribution: &Distribution,
    assignments: &[Assignment],
) -> Result<String, ExportError> {
    let json = encode_export(distribution, assignments)?;
    let digest = Sha256::digest(json.as_bytes());
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
