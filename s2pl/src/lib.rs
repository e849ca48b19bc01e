// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! s2pl - a strict two-phase locking transaction manager
//!
//! The transaction manager sits between query execution and storage. It
//! hands out transaction contexts, takes shared/exclusive row locks through a
//! pluggable `LockManager`, records undo for every write, and drains each
//! transaction exactly once on commit or abort.
//!
//! # Features
//!
//! - **Strict 2PL**: exclusive locks are held until commit or abort
//! - **Isolation levels**: READ UNCOMMITTED through SERIALIZABLE, expressed
//!   as shared-lock policies
//! - **Rollback**: LIFO undo of inserts, updates and deletes
//! - **Bundled lock table**: FIFO queues, S->X upgrades, wait-for deadlock
//!   detection and optional wait timeouts
//! - **In-memory table heap** with tombstone deletes for embedding and tests
//!
//! # Usage
//!
//! ```ignore
//! use s2pl::{IsolationLevel, MemoryTableHeap, TableInfo, Tuple, TwoPhaseLockManager, TxnManagerConfig};
//!
//! let manager = TwoPhaseLockManager::with_lock_table(&TxnManagerConfig::default())?;
//! let table = Arc::new(TableInfo::new(1, "accounts", Arc::new(MemoryTableHeap::new())));
//!
//! let txn = manager.begin(IsolationLevel::RepeatableRead);
//! let rid = manager.insert(&txn, &Tuple::from("alice:100"), &table)?;
//! manager.commit(&txn)?;
//! ```

pub mod config;
pub mod error;
pub mod lock;
pub mod storage;
pub mod txn;

pub use config::{LockTableConfig, TxnManagerConfig};
pub use error::{TxnError, TxnResult};
pub use lock::{LockManager, LockMode, LockTable, LockTableStatistics, RangePredicate};
pub use storage::{MemoryTableHeap, Rid, TableHeap, TableInfo, TableOid, Tuple};
pub use txn::{
    AbortAction, AbortReason, CommitAction, IsolationLevel, LogSink, NoopLogSink,
    TransactionContext, TransactionRegistry, TransactionState, TransactionStatistics,
    TwoPhaseLockManager, TxnId,
};

/// s2pl version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
