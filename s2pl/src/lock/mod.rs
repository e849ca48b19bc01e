// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock manager interface
//!
//! The transaction manager never arbitrates conflicts itself. It asks a
//! `LockManager` for shared/exclusive locks on RIDs; the lock manager blocks
//! the caller, grants the lock and records it in the context, or marks the
//! context aborted (deadlock victim, timeout) and fails the request.

pub mod table;

pub use table::{LockTable, LockTableStatistics};

use serde::{Deserialize, Serialize};
use std::ops::{Bound, RangeBounds};

use crate::error::{TxnError, TxnResult};
use crate::storage::{Rid, TableOid};
use crate::txn::TransactionContext;

/// Lock modes for read/write access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared lock for reads (multiple readers allowed)
    Shared,
    /// Exclusive lock for writes (single writer, no readers)
    Exclusive,
}

impl LockMode {
    pub fn is_compatible_with(&self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "S",
            LockMode::Exclusive => "X",
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A RID range within one table, used for SERIALIZABLE predicate locks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePredicate {
    pub table: TableOid,
    pub low: Bound<Rid>,
    pub high: Bound<Rid>,
}

impl RangePredicate {
    pub fn new(table: TableOid, range: impl RangeBounds<Rid>) -> Self {
        Self {
            table,
            low: range.start_bound().cloned(),
            high: range.end_bound().cloned(),
        }
    }

    /// Predicate covering exactly one record
    pub fn point(table: TableOid, rid: Rid) -> Self {
        Self::new(table, rid..=rid)
    }

    pub fn contains(&self, table: TableOid, rid: Rid) -> bool {
        table == self.table && (self.low.as_ref(), self.high.as_ref()).contains(&rid)
    }
}

/// Per-RID shared/exclusive lock arbitration
pub trait LockManager: Send + Sync {
    /// Block until `ctx` holds S on `rid`, then record it in the context.
    /// Fails with `Aborted` if the context is (or becomes) a victim.
    fn lock_shared(&self, ctx: &TransactionContext, rid: Rid) -> TxnResult<()>;

    /// Block until `ctx` holds X on `rid`. Upgrades an S lock held by `ctx`
    /// and moves the RID from the shared to the exclusive set.
    fn lock_exclusive(&self, ctx: &TransactionContext, rid: Rid) -> TxnResult<()>;

    /// X-lock a row the caller has just placed in a table heap. A lock
    /// manager that can grant without waiting for never-seen RIDs should
    /// override this.
    fn lock_inserted(&self, ctx: &TransactionContext, rid: Rid) -> TxnResult<()> {
        self.lock_exclusive(ctx, rid)
    }

    /// Release whichever mode `ctx` holds on `rid`. Never blocks. Returns
    /// false if no lock was held.
    fn unlock(&self, ctx: &TransactionContext, rid: Rid) -> bool;

    /// Whether `lock_range` is implemented
    fn supports_range_locks(&self) -> bool {
        false
    }

    /// Lock every RID `predicate` covers, including ones not yet inserted.
    /// Held until the transaction finishes.
    fn lock_range(
        &self,
        ctx: &TransactionContext,
        predicate: &RangePredicate,
        mode: LockMode,
    ) -> TxnResult<()> {
        let _ = (ctx, predicate, mode);
        Err(TxnError::Unsupported(
            "range locks are not supported by this lock manager".to_string(),
        ))
    }
}
