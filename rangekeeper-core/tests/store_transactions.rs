//! Integration tests for lock-guarded transactions and the project registry.

use rangekeeper_core::projects::{self, LoadFileChange, ProjectChanges, ProjectId};
use rangekeeper_core::{EngineConfig, RangeError, Store, UnitRange, Universe};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn r(lo: u32, hi: u32) -> UnitRange {
    UnitRange::new(lo, hi).unwrap()
}

fn config(dir: &Path) -> EngineConfig {
    EngineConfig::default()
        .with_state_dir(dir)
        .with_universe(Universe::new(9000, 9100).unwrap())
}

fn reserved(store: &Store) -> Vec<UnitRange> {
    store
        .read(|txn| Ok(txn.reserved().ranges().to_vec()))
        .unwrap()
}

#[test]
fn state_survives_reopening_the_store() {
    let dir = tempdir().unwrap();

    let first = Store::open(config(dir.path())).unwrap();
    let allocation = first.transact(|txn| txn.allocate(6)).unwrap();
    assert_eq!(allocation.primary, 9000);
    assert_eq!(allocation.spares, vec![r(9001, 9005)]);
    drop(first);

    let second = Store::open(config(dir.path())).unwrap();
    assert_eq!(reserved(&second), vec![r(9000, 9005)]);

    let next = second.transact(|txn| txn.allocate(2)).unwrap();
    assert_eq!(next.primary, 9006);
    assert_eq!(next.spares, vec![r(9007, 9007)]);
}

#[test]
fn dropping_a_transaction_discards_changes() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();

    {
        let mut txn = store.begin().unwrap();
        txn.reserve(&[r(9010, 9020)]).unwrap();
        txn.write_document("notes.json", &"draft").unwrap();
    }

    assert!(reserved(&store).is_empty());
    assert!(!dir.path().join("notes.json").exists());
    assert!(!dir.path().join("reserved.json").exists());
}

#[test]
fn batch_reserve_is_all_or_nothing() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    store.transact(|txn| txn.reserve(&[r(9050, 9055)])).unwrap();

    let err = store
        .transact(|txn| txn.reserve(&[r(9000, 9004), r(9010, 9010), r(9054, 9060)]))
        .unwrap_err();
    match err {
        RangeError::OverlappingRange { range, existing } => {
            assert_eq!(range, r(9054, 9060));
            assert_eq!(existing, r(9050, 9055));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Within a still-open transaction the snapshot is untouched as well.
    let mut txn = store.begin().unwrap();
    assert!(txn.reserve(&[r(9000, 9004), r(9052, 9052)]).is_err());
    assert_eq!(txn.reserved().ranges(), &[r(9050, 9055)]);
}

#[test]
fn strict_release_rejects_free_units() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    store.transact(|txn| txn.reserve(&[r(9000, 9009)])).unwrap();

    let err = store
        .transact(|txn| txn.release(&[r(9000, 9001), r(9008, 9012)]))
        .unwrap_err();
    assert_eq!(err.code(), "E102");
    assert_eq!(reserved(&store), vec![r(9000, 9009)]);

    store
        .transact(|txn| txn.release(&[r(9000, 9001), r(9008, 9009)]))
        .unwrap();
    assert_eq!(reserved(&store), vec![r(9002, 9007)]);
}

#[test]
fn capacity_boundary_is_exact() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    store.transact(|txn| txn.reserve(&[r(9000, 9049)])).unwrap();

    let err = store.transact(|txn| txn.allocate(51)).unwrap_err();
    assert_eq!(err.code(), "E201");
    assert_eq!(reserved(&store), vec![r(9000, 9049)]);

    store.transact(|txn| txn.allocate(50)).unwrap();
    assert_eq!(reserved(&store), vec![r(9000, 9099)]);
}

#[test]
fn lock_timeout_is_reported() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    let impatient =
        Store::open(config(dir.path()).with_lock_timeout(Duration::from_millis(50))).unwrap();

    let held = store.begin().unwrap();
    let err = impatient.begin().unwrap_err();
    assert_eq!(err.code(), "E302");
    drop(held);

    assert!(impatient.begin().is_ok());
}

#[test]
fn concurrent_transactions_are_serialized() {
    const WORKERS: usize = 8;
    const ROUNDS: usize = 5;

    let dir = tempdir().unwrap();
    let state_dir = dir.path().to_path_buf();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let state_dir = state_dir.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Each worker opens its own store, as separate invocations would.
                let store = Store::open(config(&state_dir)).unwrap();
                barrier.wait();
                (0..ROUNDS)
                    .map(|_| store.transact(|txn| txn.allocate(2)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut units = BTreeSet::new();
    for handle in handles {
        for allocation in handle.join().unwrap() {
            for unit in allocation.ranges().flat_map(|r| r.units()) {
                assert!(units.insert(unit), "unit {unit} allocated twice");
            }
        }
    }

    let total = (WORKERS * ROUNDS * 2) as u32;
    assert_eq!(units.len(), total as usize);

    let store = Store::open(config(&state_dir)).unwrap();
    assert_eq!(reserved(&store), vec![r(9000, 9000 + total - 1)]);
}

#[test]
fn project_lifecycle() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();

    let first = store
        .transact(|txn| projects::publish(txn, "alice", PathBuf::from("/data/a"), None))
        .unwrap();
    assert_eq!(first.port, 9000);
    assert_eq!(first.port_ranges, vec![r(9001, 9005)]);
    assert!(
        dir.path()
            .join(format!("projects/{}/config.json", first.id))
            .exists()
    );

    let second = store
        .transact(|txn| {
            projects::publish(
                txn,
                "alice",
                PathBuf::from("/data/b"),
                Some(PathBuf::from("scene.pvsm")),
            )
        })
        .unwrap();
    assert_eq!(second.port, 9006);

    let listed = store.read(|txn| projects::list(txn, "alice")).unwrap();
    assert_eq!(listed, vec![first.clone(), second.clone()]);

    let modified = store
        .transact(|txn| {
            projects::modify(
                txn,
                "alice",
                &second.id,
                ProjectChanges {
                    data_dir: Some(PathBuf::from("/data/c")),
                    load_file: LoadFileChange::Clear,
                },
            )
        })
        .unwrap();
    assert_eq!(modified.data_dir, PathBuf::from("/data/c"));
    assert_eq!(modified.load_file, None);
    assert_eq!(modified.port, second.port);

    store
        .transact(|txn| projects::unpublish(txn, "alice", &first.id))
        .unwrap();
    assert_eq!(reserved(&store), vec![r(9006, 9011)]);
    assert!(!dir.path().join(format!("projects/{}", first.id)).exists());

    // The freed units are handed out again, lowest first.
    let third = store
        .transact(|txn| projects::publish(txn, "bob", PathBuf::from("/data/d"), None))
        .unwrap();
    assert_eq!(third.port, 9000);
    assert_eq!(reserved(&store), vec![r(9000, 9011)]);

    store
        .transact(|txn| projects::unpublish(txn, "alice", &second.id))
        .unwrap();
    let index = store.read(|txn| projects::load_index(txn)).unwrap();
    assert_eq!(index.owners().collect::<Vec<_>>(), vec!["bob"]);
}

#[test]
fn projects_are_scoped_to_their_owner() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();

    let record = store
        .transact(|txn| projects::publish(txn, "alice", PathBuf::from("/data"), None))
        .unwrap();

    let err = store
        .transact(|txn| projects::unpublish(txn, "mallory", &record.id))
        .unwrap_err();
    assert_eq!(err.code(), "E501");

    let unknown = ProjectId::generate();
    let err = store
        .read(|txn| projects::show(txn, "alice", &unknown))
        .unwrap_err();
    assert_eq!(err.code(), "E501");

    assert!(store.read(|txn| projects::list(txn, "mallory")).unwrap().is_empty());
    assert_eq!(reserved(&store), vec![r(9000, 9005)]);
}

#[test]
fn unpublish_tolerates_units_freed_elsewhere() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();

    let stale = store
        .transact(|txn| projects::publish(txn, "alice", PathBuf::from("/data/a"), None))
        .unwrap();
    let kept = store
        .transact(|txn| projects::publish(txn, "alice", PathBuf::from("/data/b"), None))
        .unwrap();

    // Free part of the first project through the raw unit interface.
    store
        .transact(|txn| txn.release(&[UnitRange::single(stale.port), r(9002, 9003)]))
        .unwrap();
    assert_eq!(reserved(&store), vec![r(9001, 9001), r(9004, 9011)]);

    store
        .transact(|txn| projects::unpublish(txn, "alice", &stale.id))
        .unwrap();

    assert_eq!(reserved(&store), vec![r(9006, 9011)]);
    let listed = store.read(|txn| projects::list(txn, "alice")).unwrap();
    assert_eq!(listed, vec![kept]);
    assert!(!dir.path().join(format!("projects/{}", stale.id)).exists());
}

#[test]
fn failed_publish_leaves_no_documents() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    store.transact(|txn| txn.reserve(&[r(9000, 9096)])).unwrap();

    let err = store
        .transact(|txn| projects::publish(txn, "alice", PathBuf::from("/data"), None))
        .unwrap_err();
    assert_eq!(err.code(), "E201");
    assert!(!dir.path().join("projects.json").exists());
    assert!(!dir.path().join("projects").exists());
    assert_eq!(reserved(&store), vec![r(9000, 9096)]);
}
