//! Canonical hashing.
//!
//! Deterministic canonical serialization + SHA-256 of a distribution's
//! placements. Row ids, distribution ids and timestamps are left out, so
//! two runs over the same input hash equal.
//!
//! Rules:
//!   - engine_version first, then partner_names, then placements
//!   - placements sorted by structure id
//!   - UTF-8 JSON, no whitespace

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::Placement;
use crate::ENGINE_VERSION;

/// Canonical JSON bytes of a placement set.
pub fn canonical_serialize(partner_names: &[String], placements: &[Placement]) -> Vec<u8> {
    build_canonical_value(partner_names, placements)
        .to_string()
        .into_bytes()
}

/// SHA-256 of [`canonical_serialize`]. Lowercase hex.
pub fn canonical_hash(partner_names: &[String], placements: &[Placement]) -> String {
    hex_digest(&canonical_serialize(partner_names, placements))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn build_canonical_value(partner_names: &[String], placements: &[Placement]) -> Value {
    let mut sorted = placements.to_vec();
    sorted.sort_by_key(|p| p.structure_id);

    let rows: Vec<Value> = sorted
        .iter()
        .map(|p| {
            let mut row = Map::new();
            row.insert("structure_id".to_string(), Value::from(p.structure_id.0));
            row.insert("partner_index".to_string(), Value::from(p.partner_index as u64));
            row.insert("random".to_string(), Value::Bool(p.random));
            Value::Object(row)
        })
        .collect();

    let mut root = Map::new();
    root.insert("engine_version".to_string(), Value::from(ENGINE_VERSION));
    root.insert(
        "partner_names".to_string(),
        Value::Array(partner_names.iter().cloned().map(Value::String).collect()),
    );
    root.insert("placements".to_string(), Value::Array(rows));
    Value::Object(root)
}
