//! Fixture harness.
//!
//! Loads a plan request fixture, plans it twice, prints per-category slot
//! counts and the canonical hash, and exits non-zero if the runs disagree
//! or any invariant fails.
//!
//! Usage: `geo_partition_engine [path/to/plan_request.json]`

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use geo_partition_engine::domain::{Placement, StructureId};
use geo_partition_engine::hashing::canonical_hash;
use geo_partition_engine::invariants::{try_validate_balance, try_validate_distribution};
use geo_partition_engine::{DistributionId, PartitionPlanner, PlanRequest, PlannerConfig};

const FIXTURE_PATHS: [&str; 3] = [
    "plan_request.json",
    "tests/fixtures/plan_request.json",
    "geo_partition_engine/tests/fixtures/plan_request.json",
];

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let explicit = std::env::args().nth(1);
    let candidates: Vec<String> = match explicit {
        Some(p) => vec![p],
        None => FIXTURE_PATHS.iter().map(|p| p.to_string()).collect(),
    };
    let Some(path) = candidates.iter().find(|p| Path::new(p.as_str()).exists()) else {
        error!(tried = ?candidates, "no plan request fixture found");
        return ExitCode::FAILURE;
    };

    let request: PlanRequest = match fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|data| serde_json::from_str(&data).map_err(|e| e.to_string()))
    {
        Ok(r) => r,
        Err(e) => {
            error!(path = %path, error = %e, "failed to load fixture");
            return ExitCode::FAILURE;
        }
    };
    info!(path = %path, structures = request.structures.len(), "fixture loaded");

    let planner = PartitionPlanner::new(PlannerConfig::default());
    let now = Utc::now();

    let run = |label: &str| match planner.generate(DistributionId(1), &request, now) {
        Ok(out) => Some(out),
        Err(e) => {
            error!(run = label, error = %e, "planning failed");
            None
        }
    };
    let (Some((d1, rows1)), Some((_, rows2))) = (run("first"), run("second")) else {
        return ExitCode::FAILURE;
    };

    let p1: Vec<Placement> = rows1.iter().map(Placement::from).collect();
    let p2: Vec<Placement> = rows2.iter().map(Placement::from).collect();
    let h1 = canonical_hash(&d1.partner_names, &p1);
    let h2 = canonical_hash(&d1.partner_names, &p2);

    let category_of: BTreeMap<StructureId, &str> = request
        .structures
        .iter()
        .map(|s| (s.id, s.category.as_str()))
        .collect();
    let mut per_category: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for a in &rows1 {
        let counts = per_category
            .entry(category_of.get(&a.structure_id).copied().unwrap_or("?"))
            .or_insert_with(|| vec![0; d1.partner_count()]);
        if let Some(c) = counts.get_mut(a.partner_index) {
            *c += 1;
        }
    }

    println!("distribution: {} ({} structures)", d1.name, d1.total);
    for (slot, name) in d1.partner_names.iter().enumerate() {
        println!("  [{}] {:<20} {}", slot, name, d1.partner_counts.get(&slot).copied().unwrap_or(0));
    }
    for (category, counts) in &per_category {
        println!("  category {:<8} {:?}", category, counts);
    }
    println!(
        "  random-flagged: {}",
        rows1.iter().filter(|a| a.random).count()
    );
    println!("  hash: {}", h1);

    let mut ok = true;
    if h1 != h2 {
        println!("[FAIL] determinism: run1={} run2={}", h1, h2);
        ok = false;
    }
    if let Err(e) = try_validate_distribution(&d1, &rows1) {
        println!("[FAIL] {}", e);
        ok = false;
    }
    if let Err(e) = try_validate_balance(&d1, &rows1, &request.structures) {
        println!("[FAIL] {}", e);
        ok = false;
    }

    if ok {
        println!("[OK] deterministic, consistent and balanced.");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
