// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Two-phase lock manager
//!
//! Drives begin/read/insert/update/delete/commit/abort under strict
//! two-phase locking. Conflicts are arbitrated by a `LockManager`; tuples
//! live in a `TableHeap`. Every write records its inverse on the context so
//! abort can undo it while the exclusive locks are still held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::context::{AbortClaim, TransactionContext};
use super::isolation::IsolationLevel;
use super::log::{AbortAction, CommitAction};
use super::registry::TransactionRegistry;
use super::sink::{LogSink, NoopLogSink};
use super::state::{AbortReason, TransactionState, TxnId};
use crate::config::TxnManagerConfig;
use crate::error::{TxnError, TxnResult};
use crate::lock::{LockManager, LockMode, LockTable, RangePredicate};
use crate::storage::{Rid, TableInfo, Tuple};

/// Transaction manager implementing strict two-phase locking
pub struct TwoPhaseLockManager {
    next_txn_id: AtomicU64,
    registry: Arc<TransactionRegistry>,
    lock_manager: Arc<dyn LockManager>,
    log_sink: Arc<dyn LogSink>,
    default_isolation_level: IsolationLevel,
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

/// Transaction statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStatistics {
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub active: usize,
}

impl TwoPhaseLockManager {
    /// Create a manager with default settings
    ///
    /// `registry` must be the registry the lock manager uses to reach
    /// deadlock victims, if it uses one.
    pub fn new(lock_manager: Arc<dyn LockManager>, registry: Arc<TransactionRegistry>) -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            registry,
            lock_manager,
            log_sink: Arc::new(NoopLogSink),
            default_isolation_level: IsolationLevel::default(),
            begun: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    pub fn with_config(
        config: &TxnManagerConfig,
        lock_manager: Arc<dyn LockManager>,
        registry: Arc<TransactionRegistry>,
    ) -> TxnResult<Self> {
        config.validate()?;
        let mut manager = Self::new(lock_manager, registry);
        manager.next_txn_id = AtomicU64::new(config.first_txn_id);
        manager.default_isolation_level = config.default_isolation_level;
        Ok(manager)
    }

    /// Create a manager backed by the bundled `LockTable`
    pub fn with_lock_table(config: &TxnManagerConfig) -> TxnResult<Self> {
        let registry = Arc::new(TransactionRegistry::new());
        let lock_table = Arc::new(LockTable::new(config.lock_table.clone(), registry.clone()));
        Self::with_config(config, lock_table, registry)
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    pub fn lock_manager(&self) -> &Arc<dyn LockManager> {
        &self.lock_manager
    }

    pub fn default_isolation_level(&self) -> IsolationLevel {
        self.default_isolation_level
    }

    /// True only when the lock manager can take predicate locks. Otherwise
    /// SERIALIZABLE transactions run as REPEATABLE READ.
    pub fn supports_serializable(&self) -> bool {
        self.lock_manager.supports_range_locks()
    }

    /// The isolation level a transaction started at `level` actually gets
    pub fn effective_isolation(&self, level: IsolationLevel) -> IsolationLevel {
        if level == IsolationLevel::Serializable && !self.supports_serializable() {
            IsolationLevel::RepeatableRead
        } else {
            level
        }
    }

    /// Start a new transaction
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<TransactionContext> {
        let txn_id = TxnId::from_u64(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let ctx = Arc::new(TransactionContext::new(txn_id, isolation_level));
        self.registry.add(&ctx);
        self.begun.fetch_add(1, Ordering::Relaxed);

        if self.effective_isolation(isolation_level) != isolation_level {
            log::debug!(
                "{} requested {} but the lock manager has no range locks; running as {}",
                txn_id,
                isolation_level,
                IsolationLevel::RepeatableRead
            );
        }
        self.log_sink.on_begin(txn_id, isolation_level);
        log::debug!("{} began ({})", txn_id, isolation_level);
        ctx
    }

    /// Start a new transaction at the configured default isolation level
    pub fn begin_default(&self) -> Arc<TransactionContext> {
        self.begin(self.default_isolation_level)
    }

    /// Look up a live transaction
    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<TransactionContext>> {
        self.registry.lookup(txn_id)
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.registry.active_ids()
    }

    /// Read the tuple at `rid`
    ///
    /// `Ok(None)` means the tuple is missing or deleted; the caller skips it
    /// and the transaction stays live.
    pub fn read(
        &self,
        ctx: &TransactionContext,
        rid: Rid,
        table: &TableInfo,
    ) -> TxnResult<Option<Tuple>> {
        self.ensure_live(ctx)?;
        let level = ctx.isolation_level();

        if level.locks_on_read() && !ctx.holds_lock(rid) {
            self.lock_manager.lock_shared(ctx, rid)?;
        }
        self.guard_range(ctx, table, rid, LockMode::Shared)?;

        let tuple = table.heap().get_tuple(rid);
        if tuple.is_none() {
            log::debug!("{} skips unreadable tuple {} in {}", ctx.txn_id(), rid, table.name());
        }

        // only the shared lock goes; an exclusive lock taken by a write stays
        if level.releases_shared_after_read() && ctx.is_shared_locked(rid) {
            self.lock_manager.unlock(ctx, rid);
        }
        Ok(tuple)
    }

    /// Insert a tuple and return its RID, exclusively locked
    pub fn insert(
        &self,
        ctx: &TransactionContext,
        tuple: &Tuple,
        table: &Arc<TableInfo>,
    ) -> TxnResult<Rid> {
        self.ensure_live(ctx)?;

        let Some(rid) = table.heap().insert_tuple(tuple) else {
            return Err(self.storage_failure(
                ctx,
                format!("table {} rejected insert", table.name()),
            ));
        };
        // undo is registered first so the row goes away even if locking aborts us
        ctx.append_abort_action(AbortAction::Insert {
            table: table.clone(),
            rid,
        });
        self.lock_manager.lock_inserted(ctx, rid)?;
        self.guard_range(ctx, table, rid, LockMode::Exclusive)?;
        Ok(rid)
    }

    /// Overwrite the tuple at `rid`, keeping the prior image for undo
    pub fn update(
        &self,
        ctx: &TransactionContext,
        new_tuple: &Tuple,
        rid: Rid,
        table: &Arc<TableInfo>,
    ) -> TxnResult<()> {
        self.ensure_live(ctx)?;
        self.lock_for_write(ctx, rid, table)?;

        let heap = table.heap();
        let Some(prior_image) = heap.get_tuple(rid) else {
            return Err(self.storage_failure(
                ctx,
                format!("no tuple at {} in table {} to update", rid, table.name()),
            ));
        };
        if !heap.update_tuple(rid, new_tuple) {
            return Err(self.storage_failure(
                ctx,
                format!("table {} rejected update of {}", table.name(), rid),
            ));
        }
        ctx.append_abort_action(AbortAction::Update {
            table: table.clone(),
            rid,
            prior_image,
        });
        Ok(())
    }

    /// Tombstone the tuple at `rid`; it is physically removed at commit
    pub fn delete(
        &self,
        ctx: &TransactionContext,
        rid: Rid,
        table: &Arc<TableInfo>,
    ) -> TxnResult<()> {
        self.ensure_live(ctx)?;
        self.lock_for_write(ctx, rid, table)?;

        if !table.heap().mark_delete(rid) {
            return Err(self.storage_failure(
                ctx,
                format!("cannot delete {} in table {}", rid, table.name()),
            ));
        }
        ctx.append_abort_action(AbortAction::Delete {
            table: table.clone(),
            rid,
        });
        ctx.append_commit_action(CommitAction::ApplyDelete {
            table: table.clone(),
            rid,
        });
        Ok(())
    }

    /// Take a predicate lock for a SERIALIZABLE scan
    ///
    /// A no-op below SERIALIZABLE and when the lock manager has no range locks.
    pub fn lock_range(&self, ctx: &TransactionContext, predicate: &RangePredicate) -> TxnResult<()> {
        self.ensure_live(ctx)?;
        if !self.range_locking(ctx) {
            return Ok(());
        }
        self.lock_manager.lock_range(ctx, predicate, LockMode::Shared)
    }

    /// Commit a transaction
    ///
    /// Fails with `StateViolation` unless the transaction is growing or
    /// shrinking. A transaction a lock manager aborted behind the client's
    /// back is rolled back before that error is returned.
    pub fn commit(&self, ctx: &TransactionContext) -> TxnResult<()> {
        let txn_id = ctx.txn_id();
        if let Err(state) = ctx.claim_commit() {
            if state == TransactionState::Aborted && !ctx.is_finished() {
                self.finish_abort(ctx, AbortReason::Explicit)?;
            }
            return Err(TxnError::StateViolation { txn_id, state });
        }

        for action in ctx.take_commit_actions() {
            let kind = action.kind();
            if let Err(e) = action.apply() {
                log::warn!("{} commit action {} failed: {}", txn_id, kind, e);
            }
        }
        self.log_sink.on_commit(txn_id);
        self.release_all_locks(ctx);
        ctx.discard_actions();
        self.deregister(txn_id);

        self.committed.fetch_add(1, Ordering::Relaxed);
        log::debug!("{} committed", txn_id);
        Ok(())
    }

    /// Roll back a transaction
    ///
    /// Aborting an already aborted transaction is a no-op; aborting a
    /// committed one is a `StateViolation`.
    pub fn abort(&self, ctx: &TransactionContext) -> TxnResult<()> {
        self.finish_abort(ctx, AbortReason::Explicit)
    }

    pub fn statistics(&self) -> TransactionStatistics {
        TransactionStatistics {
            begun: self.begun.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            active: self.registry.len(),
        }
    }

    fn ensure_live(&self, ctx: &TransactionContext) -> TxnResult<()> {
        let state = ctx.state();
        if state.is_terminal() {
            return Err(TxnError::StateViolation {
                txn_id: ctx.txn_id(),
                state,
            });
        }
        if !self.registry.contains(ctx.txn_id()) {
            return Err(TxnError::UnknownTransaction(ctx.txn_id()));
        }
        Ok(())
    }

    fn range_locking(&self, ctx: &TransactionContext) -> bool {
        ctx.isolation_level().requires_range_locks() && self.lock_manager.supports_range_locks()
    }

    fn guard_range(
        &self,
        ctx: &TransactionContext,
        table: &TableInfo,
        rid: Rid,
        mode: LockMode,
    ) -> TxnResult<()> {
        if self.range_locking(ctx) {
            self.lock_manager
                .lock_range(ctx, &RangePredicate::point(table.oid(), rid), mode)?;
        }
        Ok(())
    }

    fn lock_for_write(&self, ctx: &TransactionContext, rid: Rid, table: &TableInfo) -> TxnResult<()> {
        if !ctx.is_exclusive_locked(rid) {
            self.lock_manager.lock_exclusive(ctx, rid)?;
        }
        self.guard_range(ctx, table, rid, LockMode::Exclusive)
    }

    fn finish_abort(&self, ctx: &TransactionContext, reason: AbortReason) -> TxnResult<()> {
        let txn_id = ctx.txn_id();
        match ctx.claim_abort(reason) {
            Err(state) => Err(TxnError::StateViolation { txn_id, state }),
            Ok(AbortClaim::AlreadyFinished) => Ok(()),
            Ok(AbortClaim::Rollback) => {
                for action in ctx.take_abort_actions() {
                    let kind = action.kind();
                    if let Err(e) = action.undo() {
                        log::warn!("{} abort action {} failed: {}", txn_id, kind, e);
                    }
                }
                self.log_sink.on_abort(txn_id);
                self.release_all_locks(ctx);
                ctx.discard_actions();
                self.deregister(txn_id);

                self.aborted.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "{} aborted ({})",
                    txn_id,
                    ctx.abort_reason().unwrap_or(reason)
                );
                Ok(())
            }
        }
    }

    /// Abort inline after the table heap rejected a write
    fn storage_failure(&self, ctx: &TransactionContext, reason: String) -> TxnError {
        log::warn!("{} storage failure: {}", ctx.txn_id(), reason);
        if let Err(e) = self.finish_abort(ctx, AbortReason::StorageFailure) {
            log::warn!("{} could not abort after storage failure: {}", ctx.txn_id(), e);
        }
        TxnError::StorageError {
            txn_id: ctx.txn_id(),
            reason,
        }
    }

    fn release_all_locks(&self, ctx: &TransactionContext) {
        for rid in ctx.held_locks() {
            if !self.lock_manager.unlock(ctx, rid) {
                log::warn!("{} had no lock on {} at release", ctx.txn_id(), rid);
            }
        }
        ctx.clear_locks();
    }

    fn deregister(&self, txn_id: TxnId) {
        if !self.registry.remove(txn_id) {
            log::warn!("{} was not registered", txn_id);
        }
    }
}
