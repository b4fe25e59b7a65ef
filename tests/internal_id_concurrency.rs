mod common;

use common::{init_test_logging, test_db_with_dir};
use issue_mover::model::NewIssue;
use issue_mover::storage::SqliteStorage;
use issue_mover::storage::internal_id::next_local_id;
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 6;
const PER_THREAD: usize = 15;

#[test]
fn concurrent_creations_never_share_an_iid() {
    init_test_logging();
    let (mut storage, dir) = test_db_with_dir();
    let author = storage.create_user("alice", "", false).unwrap();
    let scope = storage.create_scope("P1", "").unwrap();
    drop(storage);

    let db_path = dir.path().join(".imv").join("imv.db");
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db_path = db_path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut storage = SqliteStorage::open_with_timeout(&db_path, Some(30_000)).unwrap();
                barrier.wait();
                (0..PER_THREAD)
                    .map(|i| {
                        let new = NewIssue::new(scope.id, format!("t{t} #{i}"), author.id);
                        storage.create_issue(&new, "alice", 3).unwrap().iid
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    let unique: BTreeSet<i64> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len(), "duplicate iids: {all:?}");
    let expected: BTreeSet<i64> = (1..=i64::try_from(THREADS * PER_THREAD).unwrap()).collect();
    assert_eq!(unique, expected);
}

#[test]
fn concurrent_allocations_are_strictly_increasing_per_connection() {
    init_test_logging();
    let (mut storage, dir) = test_db_with_dir();
    let scope = storage.create_scope("P1", "").unwrap();
    drop(storage);

    let db_path = dir.path().join(".imv").join("imv.db");
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db_path = db_path.clone();
            thread::spawn(move || {
                let mut storage = SqliteStorage::open_with_timeout(&db_path, Some(30_000)).unwrap();
                (0..20)
                    .map(|_| {
                        storage
                            .mutate("allocate", "test", |tx, _| next_local_id(tx, scope.id))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = BTreeSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        for id in ids {
            assert!(all.insert(id), "id {id} handed out twice");
        }
    }
    assert_eq!(all.len(), 80);
}
