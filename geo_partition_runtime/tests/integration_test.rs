//! Integration tests for geo_partition_runtime.
//!
//! All tests use temporary directories for isolation. The catalog is the
//! Madrid fixture shipped with the engine crate.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use geo_partition_engine::invariants::{
    try_validate_activation, try_validate_balance, try_validate_distribution,
};
use geo_partition_engine::{
    ActivationScope, Assignment, Distribution, DistributionId, PlanRequest, PlannerConfig,
    Structure, StructureId,
};

use geo_partition_runtime::{
    ActivationManager, AssignmentStore, DistributionService, Error, FileStore, InMemoryCatalog,
    ManualAdjustmentService, MemoryStore, StoreError,
};

/// Load the plan request fixture from the engine crate.
fn load_fixture() -> PlanRequest {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("geo_partition_engine")
        .join("tests")
        .join("fixtures")
        .join("plan_request.json");
    let json_str = fs::read_to_string(&path).expect("Failed to read plan_request.json");
    serde_json::from_str(&json_str).expect("Failed to parse plan_request.json")
}

/// Create a temp directory for a test.
fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("geo_partition_runtime_tests")
        .join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

struct Services<S> {
    distributions: DistributionService<S, InMemoryCatalog>,
    adjustments: ManualAdjustmentService<S, InMemoryCatalog>,
    activation: ActivationManager<S>,
}

fn services<S: AssignmentStore>(store: Arc<S>, structures: Vec<Structure>) -> Services<S> {
    let catalog = Arc::new(InMemoryCatalog::new(structures));
    Services {
        distributions: DistributionService::new(
            store.clone(),
            catalog.clone(),
            PlannerConfig::default(),
        ),
        adjustments: ManualAdjustmentService::new(store.clone(), catalog),
        activation: ActivationManager::new(store),
    }
}

fn category_counts(structures: &[Structure], rows: &[Assignment]) -> BTreeMap<String, usize> {
    let category_of: BTreeMap<StructureId, &str> = structures
        .iter()
        .map(|s| (s.id, s.category.as_str()))
        .collect();
    let mut counts = BTreeMap::new();
    for a in rows {
        *counts
            .entry(category_of[&a.structure_id].to_string())
            .or_insert(0) += 1;
    }
    counts
}

// ─────────────────────────────────────────────────────────────
// Test 1: generate_survives_reopen
// ─────────────────────────────────────────────────────────────

#[test]
fn generate_survives_reopen() {
    let dir = temp_dir("reopen");
    let path = dir.join("distributions.store");
    let request = load_fixture();

    let (d, rows) = {
        let svc = services(
            Arc::new(FileStore::open(&path).expect("open store")),
            request.structures.clone(),
        );
        let d = svc.distributions.generate(&request).expect("generate");
        let rows = svc.distributions.items(d.id).expect("items");
        (d, rows)
    };

    let reopened = FileStore::open(&path).expect("reopen store");
    assert_eq!(reopened.load(d.id).expect("load"), d);
    assert_eq!(reopened.load_items(d.id).expect("load items"), rows);
    assert_eq!(
        reopened.next_distribution_id().expect("next id"),
        DistributionId(d.id.0 + 1),
        "ids must not be reused after reopen"
    );
}

// ─────────────────────────────────────────────────────────────
// Test 2: generated_fixture_is_consistent_and_balanced
// ─────────────────────────────────────────────────────────────

#[test]
fn generated_fixture_is_consistent_and_balanced() {
    let request = load_fixture();
    let svc = services(Arc::new(MemoryStore::new()), request.structures.clone());
    let d = svc.distributions.generate(&request).expect("generate");
    let rows = svc.distributions.items(d.id).expect("items");

    assert_eq!(d.total, request.structures.len());
    assert_eq!(d.partner_counts.values().sum::<usize>(), d.total);
    assert_eq!(d.filter, request.filter);
    try_validate_distribution(&d, &rows).expect("consistent");
    try_validate_balance(&d, &rows, &request.structures).expect("balanced");
}

// ─────────────────────────────────────────────────────────────
// Test 3: swap_twice_restores
// ─────────────────────────────────────────────────────────────

#[test]
fn swap_twice_restores() {
    let request = load_fixture();
    let svc = services(Arc::new(MemoryStore::new()), request.structures.clone());
    let d = svc.distributions.generate(&request).expect("generate");
    let before = svc.distributions.items(d.id).expect("items");

    let mut rng = StdRng::seed_from_u64(11);
    let picks: Vec<&Assignment> = before.choose_multiple(&mut rng, 10).collect();
    for pair in picks.chunks(2) {
        let (a, b) = (pair[0].structure_id, pair[1].structure_id);
        svc.adjustments.swap(d.id, a, b).expect("first swap");
        svc.adjustments.swap(d.id, a, b).expect("second swap");
    }

    let after = svc.distributions.items(d.id).expect("items");
    for (x, y) in before.iter().zip(&after) {
        assert_eq!(x.structure_id, y.structure_id);
        assert_eq!(
            x.partner_index, y.partner_index,
            "structure {} changed slot after a double swap",
            x.structure_id
        );
    }
    assert_eq!(svc.distributions.get(d.id).expect("get").partner_counts, d.partner_counts);
}

// ─────────────────────────────────────────────────────────────
// Test 4: remove_by_category_counts
// ─────────────────────────────────────────────────────────────

#[test]
fn remove_by_category_counts() {
    let request = load_fixture();
    let svc = services(Arc::new(MemoryStore::new()), request.structures.clone());
    let d = svc.distributions.generate(&request).expect("generate");
    let expected = category_counts(&request.structures, &svc.distributions.items(d.id).unwrap())
        ["mupi"];

    let removed = svc
        .adjustments
        .remove_by_category(d.id, "mupi")
        .expect("remove");
    assert_eq!(removed, expected, "exactly the mupi rows are removed");

    let after = svc.distributions.get(d.id).expect("header must still exist");
    assert_eq!(after.total, d.total - removed);
    assert_eq!(after.partner_counts.values().sum::<usize>(), after.total);
    let rows = svc.distributions.items(d.id).unwrap();
    assert!(!category_counts(&request.structures, &rows).contains_key("mupi"));
}

// ─────────────────────────────────────────────────────────────
// Test 5: redistribute_keeps_balance_and_identity
// ─────────────────────────────────────────────────────────────

#[test]
fn redistribute_keeps_balance_and_identity() {
    let dir = temp_dir("redistribute");
    let request = load_fixture();
    let svc = services(
        Arc::new(FileStore::open(&dir.join("distributions.store")).expect("open")),
        request.structures.clone(),
    );
    let d = svc.distributions.generate(&request).expect("generate");
    svc.adjustments
        .remove_by_region(d.id, "retiro")
        .expect("remove region");
    let remaining = svc.distributions.get(d.id).unwrap().total;

    let partners: Vec<String> = ["Uno", "Dos", "Tres", "Cuatro", "Cinco"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let r = svc
        .distributions
        .redistribute(d.id, 300.0, partners.clone())
        .expect("redistribute");

    assert_eq!(r.id, d.id);
    assert_eq!(r.name, d.name);
    assert_eq!(r.created_at, d.created_at);
    assert_eq!(r.partner_names, partners);
    assert_eq!(r.total, remaining, "only the attached structures are replanned");

    let rows = svc.distributions.items(d.id).unwrap();
    try_validate_distribution(&r, &rows).expect("consistent");
    try_validate_balance(&r, &rows, &request.structures).expect("balanced");
}

// ─────────────────────────────────────────────────────────────
// Test 6: rebalance_after_region_removal
// ─────────────────────────────────────────────────────────────

#[test]
fn rebalance_after_region_removal() {
    let request = load_fixture();
    let svc = services(Arc::new(MemoryStore::new()), request.structures.clone());
    let d = svc.distributions.generate(&request).expect("generate");
    svc.adjustments
        .remove_by_region(d.id, "chamberi")
        .expect("remove region");

    let (r, moved) = svc.distributions.rebalance(d.id).expect("rebalance");
    let rows = svc.distributions.items(d.id).unwrap();
    try_validate_balance(&r, &rows, &request.structures).expect("balanced after rebalance");
    assert!(
        rows.iter().filter(|a| a.random).count() >= moved,
        "every moved row carries the random flag"
    );

    let (_, again) = svc.distributions.rebalance(d.id).expect("rebalance again");
    assert_eq!(again, 0, "a balanced distribution needs no moves");
}

// ─────────────────────────────────────────────────────────────
// Test 7: activation_single_active_across_reopen
// ─────────────────────────────────────────────────────────────

#[test]
fn activation_single_active_across_reopen() {
    let dir = temp_dir("activation");
    let path = dir.join("distributions.store");
    let request = load_fixture();
    let scope = ActivationScope::default();

    let (first, second) = {
        let svc = services(Arc::new(FileStore::open(&path).unwrap()), request.structures.clone());
        let first = svc.distributions.generate(&request).unwrap();
        let second = svc.distributions.generate(&request).unwrap();
        svc.activation.set_active(first.id, &scope).unwrap();
        svc.activation.set_active(second.id, &scope).unwrap();
        (first, second)
    };

    let store = Arc::new(FileStore::open(&path).unwrap());
    let headers: Vec<Distribution> = store.list().unwrap();
    try_validate_activation(&headers).expect("single active per scope");
    let manager = ActivationManager::new(store);
    let active = manager.active_for(&scope).unwrap().expect("one is active");
    assert_eq!(active.id, second.id);
    assert_ne!(active.id, first.id);
}

// ─────────────────────────────────────────────────────────────
// Test 8: stale_reference_leaves_store_untouched
// ─────────────────────────────────────────────────────────────

#[test]
fn stale_reference_leaves_store_untouched() {
    let request = load_fixture();
    let store = Arc::new(MemoryStore::new());
    let svc = services(store.clone(), request.structures.clone());
    let d = svc.distributions.generate(&request).unwrap();
    let before = svc.distributions.items(d.id).unwrap();

    let gone = request.structures[7].id;
    let pruned: Vec<Structure> = request
        .structures
        .iter()
        .filter(|s| s.id != gone)
        .cloned()
        .collect();
    let stale = services(store, pruned);

    match stale.distributions.redistribute(d.id, 100.0, request.partner_names.clone()) {
        Err(Error::StaleReference(ids)) => assert_eq!(ids, vec![gone]),
        other => panic!("Expected StaleReference, got: {:?}", other),
    }
    assert!(matches!(
        stale.adjustments.remove_by_category(d.id, "8x3"),
        Err(Error::StaleReference(_))
    ));
    assert_eq!(stale.distributions.items(d.id).unwrap(), before);
}

// ─────────────────────────────────────────────────────────────
// Test 9: corrupted_store_detection
// ─────────────────────────────────────────────────────────────

#[test]
fn corrupted_store_detection() {
    let dir = temp_dir("corrupted_store");
    let path = dir.join("distributions.store");
    let request = load_fixture();
    {
        let svc = services(Arc::new(FileStore::open(&path).unwrap()), request.structures.clone());
        svc.distributions.generate(&request).unwrap();
    }

    // Corrupt the store by truncating 10 bytes from the end
    let data = fs::read(&path).expect("read store");
    fs::write(&path, &data[..data.len() - 10]).expect("truncate");

    match FileStore::open(&path) {
        Err(StoreError::Corrupt(_)) => {}
        Err(other) => panic!("Expected Corrupt, got: {:?}", other),
        Ok(_) => panic!("Corrupted store must not open"),
    }
}

// ─────────────────────────────────────────────────────────────
// Test 10: failed_write_is_atomic
// ─────────────────────────────────────────────────────────────

/// Memory store whose row replacement always fails.
struct BrokenReplaceStore(MemoryStore);

impl AssignmentStore for BrokenReplaceStore {
    fn next_distribution_id(&self) -> Result<DistributionId, StoreError> {
        self.0.next_distribution_id()
    }
    fn save_new(&self, d: &Distribution, rows: &[Assignment]) -> Result<(), StoreError> {
        self.0.save_new(d, rows)
    }
    fn load(&self, id: DistributionId) -> Result<Distribution, StoreError> {
        self.0.load(id)
    }
    fn load_items(&self, id: DistributionId) -> Result<Vec<Assignment>, StoreError> {
        self.0.load_items(id)
    }
    fn list(&self) -> Result<Vec<Distribution>, StoreError> {
        self.0.list()
    }
    fn replace_items(&self, _: &Distribution, _: &[Assignment]) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }
    fn delete_distribution(&self, id: DistributionId) -> Result<(), StoreError> {
        self.0.delete_distribution(id)
    }
    fn delete_items_where(
        &self,
        id: DistributionId,
        predicate: &dyn Fn(&Assignment) -> bool,
    ) -> Result<(Distribution, usize), StoreError> {
        self.0.delete_items_where(id, predicate)
    }
    fn set_active_flags(&self, flags: &[(DistributionId, bool)]) -> Result<(), StoreError> {
        self.0.set_active_flags(flags)
    }
}

#[test]
fn failed_write_is_atomic() {
    let request = load_fixture();
    let svc = services(
        Arc::new(BrokenReplaceStore(MemoryStore::new())),
        request.structures.clone(),
    );
    let d = svc.distributions.generate(&request).unwrap();
    let rows = svc.distributions.items(d.id).unwrap();

    let err = svc
        .distributions
        .redistribute(d.id, 80.0, vec!["X".into(), "Y".into()])
        .unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(StoreError::Io(_))));

    let a = rows[0].structure_id;
    let b = rows[1].structure_id;
    assert!(matches!(
        svc.adjustments.swap(d.id, a, b),
        Err(Error::StoreUnavailable(_))
    ));

    assert_eq!(svc.distributions.get(d.id).unwrap(), d, "header unchanged");
    assert_eq!(svc.distributions.items(d.id).unwrap(), rows, "rows unchanged");
}

// ─────────────────────────────────────────────────────────────
// Test 11: export_import_roundtrip
// ─────────────────────────────────────────────────────────────

#[test]
fn export_import_roundtrip() {
    let dir = temp_dir("export_import");
    let request = load_fixture();
    let svc = services(Arc::new(MemoryStore::new()), request.structures.clone());
    let d = svc.distributions.generate(&request).unwrap();
    svc.activation
        .set_active(d.id, &d.activation_scope())
        .unwrap();

    let file = dir.join("export.json");
    svc.distributions.export(d.id, &file).expect("export");
    let imported = svc.distributions.import(&file).expect("import");

    assert_ne!(imported.id, d.id);
    assert!(!imported.active, "imports start inactive");
    assert_eq!(imported.partner_counts, d.partner_counts);
    let original: Vec<(StructureId, usize)> = svc
        .distributions
        .items(d.id)
        .unwrap()
        .iter()
        .map(|a| (a.structure_id, a.partner_index))
        .collect();
    let copied: Vec<(StructureId, usize)> = svc
        .distributions
        .items(imported.id)
        .unwrap()
        .iter()
        .map(|a| (a.structure_id, a.partner_index))
        .collect();
    assert_eq!(original, copied);
}

// ─────────────────────────────────────────────────────────────
// Test 12: empty_input_is_rejected_without_side_effects
// ─────────────────────────────────────────────────────────────

#[test]
fn empty_input_is_rejected_without_side_effects() {
    let mut request = load_fixture();
    request.structures.clear();
    let svc = services(Arc::new(MemoryStore::new()), Vec::new());

    assert!(matches!(
        svc.distributions.generate(&request),
        Err(Error::Plan(geo_partition_engine::PlanError::EmptyInput))
    ));
    assert!(svc.distributions.list().unwrap().is_empty());
}
