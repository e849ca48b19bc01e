// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-transaction state
//!
//! A context is driven by one client thread, but the lock manager may mark
//! it aborted from another thread when it picks a deadlock victim. Every
//! piece of mutable state therefore sits behind its own mutex; the status
//! mutex is the one that serializes lifecycle transitions.

use std::collections::HashSet;

use parking_lot::Mutex;

use super::isolation::IsolationLevel;
use super::log::{AbortAction, CommitAction};
use super::state::{AbortReason, TransactionState, TxnId};
use crate::storage::Rid;

#[derive(Debug)]
struct Status {
    state: TransactionState,
    abort_reason: Option<AbortReason>,
    /// Set once commit or abort has claimed the context for draining
    finished: bool,
}

#[derive(Debug, Default)]
struct LockSets {
    shared: HashSet<Rid>,
    exclusive: HashSet<Rid>,
}

#[derive(Debug, Default)]
struct ActionQueues {
    abort: Vec<AbortAction>,
    commit: Vec<CommitAction>,
}

/// Outcome of claiming a context for abort processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbortClaim {
    /// The caller owns the rollback and must drain the context
    Rollback,
    /// A previous abort already drained the context
    AlreadyFinished,
}

/// State of one live transaction
#[derive(Debug)]
pub struct TransactionContext {
    txn_id: TxnId,
    isolation_level: IsolationLevel,
    status: Mutex<Status>,
    locks: Mutex<LockSets>,
    actions: Mutex<ActionQueues>,
}

impl TransactionContext {
    pub fn new(txn_id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            txn_id,
            isolation_level,
            status: Mutex::new(Status {
                state: TransactionState::Growing,
                abort_reason: None,
                finished: false,
            }),
            locks: Mutex::new(LockSets::default()),
            actions: Mutex::new(ActionQueues::default()),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        self.status.lock().state
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.status.lock().abort_reason
    }

    pub fn is_aborted(&self) -> bool {
        self.state() == TransactionState::Aborted
    }

    pub fn is_committed(&self) -> bool {
        self.state() == TransactionState::Committed
    }

    /// Whether commit or abort has already drained this context
    pub fn is_finished(&self) -> bool {
        self.status.lock().finished
    }

    /// Mark the transaction committed
    pub fn set_committed(&self) {
        self.status.lock().state = TransactionState::Committed;
    }

    /// Mark the transaction aborted. The first recorded reason wins; a
    /// committed transaction is left untouched.
    pub fn set_aborted(&self, reason: AbortReason) {
        let mut status = self.status.lock();
        if status.state == TransactionState::Committed {
            return;
        }
        status.state = TransactionState::Aborted;
        status.abort_reason.get_or_insert(reason);
    }

    /// Enter the shrinking phase. Returns false unless the context was growing.
    pub fn set_shrinking(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != TransactionState::Growing {
            return false;
        }
        status.state = TransactionState::Shrinking;
        true
    }

    /// Atomically move a growing/shrinking context to COMMITTED and claim it
    /// for draining. Returns the current state when that is not allowed.
    pub(crate) fn claim_commit(&self) -> Result<(), TransactionState> {
        let mut status = self.status.lock();
        if status.finished || status.state.is_terminal() {
            return Err(status.state);
        }
        status.state = TransactionState::Committed;
        status.finished = true;
        Ok(())
    }

    /// Atomically move the context to ABORTED and claim it for draining
    pub(crate) fn claim_abort(&self, reason: AbortReason) -> Result<AbortClaim, TransactionState> {
        let mut status = self.status.lock();
        match (status.state, status.finished) {
            (TransactionState::Committed, _) => Err(TransactionState::Committed),
            (TransactionState::Aborted, true) => Ok(AbortClaim::AlreadyFinished),
            _ => {
                status.state = TransactionState::Aborted;
                status.abort_reason.get_or_insert(reason);
                status.finished = true;
                Ok(AbortClaim::Rollback)
            }
        }
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.locks.lock().shared.contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.locks.lock().exclusive.contains(&rid)
    }

    /// Whether any lock mode is held on `rid`
    pub fn holds_lock(&self, rid: Rid) -> bool {
        let locks = self.locks.lock();
        locks.shared.contains(&rid) || locks.exclusive.contains(&rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        let mut locks = self.locks.lock();
        if !locks.exclusive.contains(&rid) {
            locks.shared.insert(rid);
        }
    }

    /// Record an exclusive lock, dropping any shared entry for the same RID
    pub fn add_exclusive_lock(&self, rid: Rid) {
        let mut locks = self.locks.lock();
        locks.shared.remove(&rid);
        locks.exclusive.insert(rid);
    }

    /// Forget whichever mode is recorded for `rid`
    pub fn remove_lock(&self, rid: Rid) -> bool {
        let mut locks = self.locks.lock();
        let shared = locks.shared.remove(&rid);
        let exclusive = locks.exclusive.remove(&rid);
        shared || exclusive
    }

    pub fn shared_lock_set(&self) -> HashSet<Rid> {
        self.locks.lock().shared.clone()
    }

    pub fn exclusive_lock_set(&self) -> HashSet<Rid> {
        self.locks.lock().exclusive.clone()
    }

    /// Union of both lock sets
    pub fn held_locks(&self) -> HashSet<Rid> {
        let locks = self.locks.lock();
        locks.shared.union(&locks.exclusive).copied().collect()
    }

    pub(crate) fn clear_locks(&self) {
        let mut locks = self.locks.lock();
        locks.shared.clear();
        locks.exclusive.clear();
    }

    pub fn append_abort_action(&self, action: AbortAction) {
        self.actions.lock().abort.push(action);
    }

    pub fn append_commit_action(&self, action: CommitAction) {
        self.actions.lock().commit.push(action);
    }

    pub fn abort_action_count(&self) -> usize {
        self.actions.lock().abort.len()
    }

    pub fn commit_action_count(&self) -> usize {
        self.actions.lock().commit.len()
    }

    /// Drain abort actions, most recent first
    pub(crate) fn take_abort_actions(&self) -> Vec<AbortAction> {
        let mut actions = std::mem::take(&mut self.actions.lock().abort);
        actions.reverse();
        actions
    }

    /// Drain commit actions in insertion order
    pub(crate) fn take_commit_actions(&self) -> Vec<CommitAction> {
        std::mem::take(&mut self.actions.lock().commit)
    }

    pub(crate) fn discard_actions(&self) {
        let mut actions = self.actions.lock();
        actions.abort.clear();
        actions.commit.clear();
    }
}
