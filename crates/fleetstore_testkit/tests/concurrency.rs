//! Many threads against one store.

use fleetstore_core::models::{Claim, User};
use fleetstore_core::{CoreError, EntityKind};
use fleetstore_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_saves_keep_every_mutation() {
    let store = TestStore::new();
    let config = StressConfig {
        threads: 8,
        ops_per_thread: 20,
    };
    let result = stress_concurrent_saves(&store.db, &config);
    assert_eq!(result.successful_ops, 160);
    assert_eq!(result.failed_ops, 0);
    // Waiting callers share writes.
    assert!(result.disk_writes <= 160);

    let on_disk = store.document_on_disk();
    assert_eq!(on_disk.claims.len(), 160);
    for t in 0..config.threads {
        for op in 0..config.ops_per_thread {
            let id = stress_claim_name(t, op);
            assert!(on_disk.claims.iter().any(|c| c.id == id), "missing {id}");
        }
    }
}

#[test]
fn readers_see_whole_records_while_writers_run() {
    let store = TestStore::new();
    let db = Arc::clone(&store.db);
    let done = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(2));

    let reader = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            let ctx = root_context();
            start.wait();
            let mut last = 0;
            while !done.load(Ordering::Acquire) {
                let claims = db.get_claims(&ctx, None).unwrap();
                assert!(claims.len() >= last, "claims went backwards");
                assert!(claims.iter().all(|c| !c.id.is_empty() && c.id == c.name));
                last = claims.len();
            }
        })
    };

    let ctx = root_context();
    start.wait();
    for n in 0..50 {
        db.create_claim(&ctx, Claim::new(format!("reader test {n}"))).unwrap();
    }
    done.store(true, Ordering::Release);
    reader.join().unwrap();
    assert_eq!(store.get_claims(&ctx, None).unwrap().len(), 50);
}

#[test]
fn duplicate_creates_race_to_one_winner() {
    let store = TestStore::new();
    let barrier = Arc::new(Barrier::new(6));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let db = Arc::clone(&store.db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                db.create_user(
                    &root_context(),
                    User::new("racer", "Race Winner", "racer@example.com"),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, CoreError::AlreadyExists { kind: EntityKind::User, .. })));
    assert_eq!(store.document_on_disk().users.len(), 1);
}

#[test]
fn record_lock_serializes_holders() {
    let store = scenarios::populated_store();
    let ctx = root_context();
    let alice = store.get_user(&ctx, "alice").unwrap();

    let guard = store.lock_record(&ctx, EntityKind::User, &alice.id).unwrap();
    assert!(store.is_record_locked(EntityKind::User, &alice.id));

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let db = Arc::clone(&store.db);
        let acquired = Arc::clone(&acquired);
        let id = alice.id.clone();
        thread::spawn(move || {
            let _guard = db.lock_record(&root_context(), EntityKind::User, &id).unwrap();
            acquired.store(true, Ordering::Release);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::Acquire));
    drop(guard);
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::Acquire));
    assert!(!store.is_record_locked(EntityKind::User, &alice.id));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn claims_follow_a_set_model(ops in claim_operations_strategy(16)) {
        let store = TestStore::new();
        let ctx = root_context();
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                ClaimOperation::Create { name } => {
                    let id = fleetstore_core::util::normalize_upper(&name);
                    let result = store.create_claim(&ctx, Claim::new(name));
                    prop_assert_eq!(result.is_ok(), model.insert(id));
                }
                ClaimOperation::Delete { name } => {
                    let id = fleetstore_core::util::normalize_upper(&name);
                    let result = store.delete_claim(&ctx, &id);
                    prop_assert_eq!(result.is_ok(), model.remove(&id));
                }
            }
        }

        let stored: BTreeSet<_> = store.document_on_disk().claims.into_iter().map(|c| c.id).collect();
        prop_assert_eq!(stored, model);
    }
}
