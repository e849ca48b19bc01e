// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction lifecycle tests against the bundled lock table

#[path = "testutils/mod.rs"]
mod testutils;

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use s2pl::{
    AbortReason, IsolationLevel, LockManager, LockMode, TransactionState, Tuple,
    TwoPhaseLockManager, TxnError, TxnManagerConfig,
};
use testutils::test_fixture::{assert_blocked, join, spawn, TestFixture};

fn balance(tuple: &Tuple) -> i64 {
    std::str::from_utf8(tuple.data())
        .expect("balance is utf8")
        .parse()
        .expect("balance is a number")
}

#[test]
fn test_commit_releases_everything() {
    let fixture = TestFixture::new();
    let rids = fixture.seed(&["a", "b", "c"]);
    let manager = fixture.manager();
    let table = fixture.table();

    let txn = fixture.begin(IsolationLevel::RepeatableRead);
    manager.read(&txn, rids[0], table).unwrap();
    manager.update(&txn, &Tuple::from("b2"), rids[1], table).unwrap();
    manager.delete(&txn, rids[2], table).unwrap();
    let inserted = manager.insert(&txn, &Tuple::from("d"), table).unwrap();

    assert_eq!(
        fixture.lock_table().lock_holders(rids[0]),
        vec![(txn.txn_id(), LockMode::Shared)]
    );
    assert_eq!(
        fixture.lock_table().lock_holders(inserted),
        vec![(txn.txn_id(), LockMode::Exclusive)]
    );

    manager.commit(&txn).unwrap();
    assert_eq!(txn.state(), TransactionState::Committed);
    assert!(txn.held_locks().is_empty());
    assert!(fixture.lock_table_is_empty());
    assert!(manager.get_transaction(txn.txn_id()).is_none());

    let contents = fixture.contents();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents.get(&rids[1]), Some(&Tuple::from("b2")));
    assert!(!contents.contains_key(&rids[2]));
    assert_eq!(contents.get(&inserted), Some(&Tuple::from("d")));
}

#[test]
fn test_uncommitted_insert_is_invisible_to_locking_readers() {
    let fixture = TestFixture::new();
    let manager = fixture.manager().clone();
    let table = fixture.table().clone();

    let writer = fixture.begin(IsolationLevel::RepeatableRead);
    let rid = manager.insert(&writer, &Tuple::from("phantom"), &table).unwrap();

    let reader_txn = fixture.begin(IsolationLevel::ReadCommitted);
    let reader = {
        let (manager, table, reader_txn) = (manager.clone(), table.clone(), reader_txn.clone());
        spawn(move || manager.read(&reader_txn, rid, &table))
    };
    assert_blocked(&reader);

    manager.abort(&writer).unwrap();
    assert_eq!(join(reader).unwrap(), None);
    assert_eq!(reader_txn.state(), TransactionState::Growing);
    manager.commit(&reader_txn).unwrap();
}

#[test]
fn test_lock_wait_timeout_aborts_waiter() {
    let config = TxnManagerConfig::from_json_str(
        r#"{ "lock_table": { "deadlock_detection": false, "wait_timeout_ms": 50 } }"#,
    )
    .unwrap();
    let fixture = TestFixture::with_config(config);
    let rid = fixture.seed(&["x"])[0];
    let manager = fixture.manager();
    let table = fixture.table();

    let holder = fixture.begin(IsolationLevel::RepeatableRead);
    manager.update(&holder, &Tuple::from("held"), rid, table).unwrap();

    let waiter = fixture.begin(IsolationLevel::RepeatableRead);
    let err = manager
        .update(&waiter, &Tuple::from("late"), rid, table)
        .unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::LockWaitTimeout));
    manager.abort(&waiter).unwrap();

    manager.commit(&holder).unwrap();
    assert_eq!(fixture.value(rid), Some(Tuple::from("held")));
    assert_eq!(fixture.lock_table().statistics().timeouts, 1);
}

#[test]
fn test_lock_after_early_release_aborts() {
    let fixture = TestFixture::new();
    let rids = fixture.seed(&["a", "b"]);
    let manager = fixture.manager();
    let table = fixture.table();

    let txn = fixture.begin(IsolationLevel::RepeatableRead);
    manager.read(&txn, rids[0], table).unwrap();

    // releasing a lock by hand ends the growing phase
    assert!(fixture.lock_table().unlock(&txn, rids[0]));
    assert_eq!(txn.state(), TransactionState::Shrinking);

    let err = manager.read(&txn, rids[1], table).unwrap_err();
    assert_eq!(
        err,
        TxnError::Aborted {
            txn_id: txn.txn_id(),
            reason: AbortReason::LockOnShrinking
        }
    );
    manager.abort(&txn).unwrap();
    assert!(fixture.lock_table_is_empty());
}

#[test]
fn test_shrinking_transaction_can_still_commit() {
    let fixture = TestFixture::new();
    let rids = fixture.seed(&["a", "b"]);
    let manager = fixture.manager();
    let table = fixture.table();

    let txn = fixture.begin(IsolationLevel::RepeatableRead);
    manager.read(&txn, rids[0], table).unwrap();
    manager.update(&txn, &Tuple::from("b2"), rids[1], table).unwrap();
    fixture.lock_table().unlock(&txn, rids[0]);

    manager.commit(&txn).unwrap();
    assert_eq!(fixture.value(rids[1]), Some(Tuple::from("b2")));
}

#[test]
fn test_concurrent_upgrade_aborts_second_upgrader() {
    let fixture = TestFixture::new();
    let rid = fixture.seed(&["shared"])[0];
    let manager = fixture.manager().clone();
    let table = fixture.table().clone();

    let t1 = fixture.begin(IsolationLevel::RepeatableRead);
    let t2 = fixture.begin(IsolationLevel::RepeatableRead);
    manager.read(&t1, rid, &table).unwrap();
    manager.read(&t2, rid, &table).unwrap();

    let first = {
        let (manager, table, t1) = (manager.clone(), table.clone(), t1.clone());
        spawn(move || manager.update(&t1, &Tuple::from("t1"), rid, &table))
    };
    assert_blocked(&first);

    let err = manager
        .update(&t2, &Tuple::from("t2"), rid, &table)
        .unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::UpgradeConflict));
    manager.abort(&t2).unwrap();

    join(first).unwrap();
    manager.commit(&t1).unwrap();
    assert_eq!(fixture.value(rid), Some(Tuple::from("t1")));
}

#[test]
fn test_serializable_runs_as_repeatable_read() {
    let fixture = TestFixture::new();
    let rid = fixture.seed(&["a"])[0];
    let manager = fixture.manager();

    assert!(!manager.supports_serializable());
    assert_eq!(
        manager.effective_isolation(IsolationLevel::Serializable),
        IsolationLevel::RepeatableRead
    );

    let txn = fixture.begin(IsolationLevel::Serializable);
    manager.read(&txn, rid, fixture.table()).unwrap();
    assert!(txn.is_shared_locked(rid));
    manager.commit(&txn).unwrap();
}

#[test]
fn test_ids_are_unique_across_threads() {
    let manager = Arc::new(TwoPhaseLockManager::with_lock_table(&TxnManagerConfig::default()).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            thread::spawn(move || {
                (0..100)
                    .map(|_| {
                        let txn = manager.begin_default();
                        manager.commit(&txn).unwrap();
                        txn.txn_id()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 800);

    let stats = manager.statistics();
    assert_eq!(stats.begun, 800);
    assert_eq!(stats.committed, 800);
    assert_eq!(stats.active, 0);
}

#[test]
fn test_concurrent_transfers_conserve_total() {
    const ACCOUNTS: usize = 4;
    const TRANSFERS: usize = 40;

    let fixture = TestFixture::new();
    let rids = Arc::new(fixture.seed(&["100"; ACCOUNTS]));
    let manager = fixture.manager().clone();
    let table = fixture.table().clone();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let (manager, table, rids) = (manager.clone(), table.clone(), rids.clone());
            thread::spawn(move || {
                let mut retries = 0;
                for i in 0..TRANSFERS {
                    let from = rids[(worker + i) % ACCOUNTS];
                    let to = rids[(worker + i + 1) % ACCOUNTS];
                    loop {
                        let txn = manager.begin(IsolationLevel::RepeatableRead);
                        let outcome = (|| -> Result<(), TxnError> {
                            let a = balance(&manager.read(&txn, from, &table)?.unwrap_or_default());
                            let b = balance(&manager.read(&txn, to, &table)?.unwrap_or_default());
                            manager.update(&txn, &Tuple::from((a - 1).to_string().as_str()), from, &table)?;
                            manager.update(&txn, &Tuple::from((b + 1).to_string().as_str()), to, &table)?;
                            manager.commit(&txn)
                        })();
                        match outcome {
                            Ok(()) => break,
                            Err(e) => {
                                assert!(e.is_fatal(), "unexpected error: {}", e);
                                manager.abort(&txn).unwrap();
                                retries += 1;
                            }
                        }
                    }
                }
                retries
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let total: i64 = fixture.contents().values().map(balance).sum();
    assert_eq!(total, 100 * ACCOUNTS as i64);
    assert!(fixture.lock_table_is_empty());
    assert_eq!(manager.statistics().active, 0);
}
