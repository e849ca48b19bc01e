// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Test fixture for s2pl integration tests
//!
//! Each fixture owns its own registry, lock table and table heap, so tests
//! can run in parallel without sharing lock state.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use s2pl::{
    IsolationLevel, LockTable, MemoryTableHeap, Rid, TableHeap, TableInfo, TransactionContext,
    TransactionRegistry, Tuple, TwoPhaseLockManager, TxnManagerConfig,
};

use super::recording_heap::RecordingHeap;

/// How long a blocked request is given before we conclude it is waiting
pub const BLOCKED: Duration = Duration::from_millis(150);

/// Upper bound for a request that should be granted
pub const GRANTED: Duration = Duration::from_secs(10);

/// Initialize env_logger once for the test binary; RUST_LOG controls output
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

enum Storage {
    Memory(Arc<MemoryTableHeap>),
    Recording(Arc<RecordingHeap>),
}

/// Transaction manager wired to a bundled lock table and one table
pub struct TestFixture {
    manager: Arc<TwoPhaseLockManager>,
    lock_table: Arc<LockTable>,
    table: Arc<TableInfo>,
    storage: Storage,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(TxnManagerConfig::default())
    }

    pub fn with_config(config: TxnManagerConfig) -> Self {
        let heap = Arc::new(MemoryTableHeap::new());
        Self::build(config, heap.clone(), Storage::Memory(heap))
    }

    /// Fixture whose table records every storage call
    pub fn recording() -> Self {
        let heap = Arc::new(RecordingHeap::new());
        Self::build(
            TxnManagerConfig::default(),
            heap.clone(),
            Storage::Recording(heap),
        )
    }

    fn build(config: TxnManagerConfig, heap: Arc<dyn TableHeap>, storage: Storage) -> Self {
        init_logging();
        let registry = Arc::new(TransactionRegistry::new());
        let lock_table = Arc::new(LockTable::new(config.lock_table.clone(), registry.clone()));
        let manager = TwoPhaseLockManager::with_config(&config, lock_table.clone(), registry)
            .expect("Failed to create transaction manager");
        Self {
            manager: Arc::new(manager),
            lock_table,
            table: Arc::new(TableInfo::new(1, "accounts", heap)),
            storage,
        }
    }

    pub fn manager(&self) -> &Arc<TwoPhaseLockManager> {
        &self.manager
    }

    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.lock_table
    }

    pub fn table(&self) -> &Arc<TableInfo> {
        &self.table
    }

    /// The recording heap, if this fixture was built with `recording()`
    pub fn recorder(&self) -> Option<&RecordingHeap> {
        match &self.storage {
            Storage::Recording(heap) => Some(&**heap),
            Storage::Memory(_) => None,
        }
    }

    pub fn begin(&self, level: IsolationLevel) -> Arc<TransactionContext> {
        self.manager.begin(level)
    }

    /// Insert committed baseline rows directly into storage
    pub fn seed(&self, rows: &[&str]) -> Vec<Rid> {
        let rids = rows
            .iter()
            .map(|row| {
                self.table
                    .heap()
                    .insert_tuple(&Tuple::from(*row))
                    .expect("Failed to seed row")
            })
            .collect();
        if let Some(recorder) = self.recorder() {
            recorder.clear();
        }
        rids
    }

    /// Visible rows, bypassing locks
    pub fn contents(&self) -> BTreeMap<Rid, Tuple> {
        match &self.storage {
            Storage::Memory(heap) => heap.snapshot(),
            Storage::Recording(heap) => heap.inner().snapshot(),
        }
    }

    pub fn value(&self, rid: Rid) -> Option<Tuple> {
        self.contents().get(&rid).cloned()
    }

    /// True when no lock is held or queued anywhere in the lock table
    pub fn lock_table_is_empty(&self) -> bool {
        self.lock_table.statistics().locked_rids == 0
    }
}

/// Run `f` on its own thread and hand back a receiver for its result
pub fn spawn<T, F>(f: F) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx
}

/// Assert the spawned work is still blocked
pub fn assert_blocked<T: std::fmt::Debug>(rx: &mpsc::Receiver<T>) {
    match rx.recv_timeout(BLOCKED) {
        Err(mpsc::RecvTimeoutError::Timeout) => {}
        other => panic!("expected the request to block, got {:?}", other),
    }
}

/// Wait for the spawned work to finish
pub fn join<T>(rx: mpsc::Receiver<T>) -> T {
    rx.recv_timeout(GRANTED)
        .expect("spawned request did not finish in time")
}
