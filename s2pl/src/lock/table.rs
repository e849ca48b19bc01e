// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Blocking lock table
//!
//! One FIFO request queue per RID, all behind a single mutex. Waiters park on
//! a shared condition variable and re-check their request whenever a lock is
//! released or a victim is chosen.
//!
//! # Grant rules
//! - A request is granted when it is compatible with every request queued
//!   ahead of it, so a reader never overtakes a waiting writer.
//! - An S->X upgrade jumps the queue: it is granted once the upgrader is
//!   the only holder. Only one upgrade may be pending per RID; a second
//!   upgrader is aborted.
//!
//! # Deadlocks
//! Before a request waits, a wait-for graph is built from the queues. If the
//! requester sits on a cycle, the youngest transaction on that cycle is
//! marked aborted and every waiter is woken; the victim withdraws its
//! request and its lock call fails with `Aborted`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::{LockManager, LockMode};
use crate::config::LockTableConfig;
use crate::error::{TxnError, TxnResult};
use crate::storage::Rid;
use crate::txn::state::{AbortReason, TransactionState, TxnId};
use crate::txn::{TransactionContext, TransactionRegistry};

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Debug, Default)]
struct RequestQueue {
    requests: Vec<LockRequest>,
    /// Transaction waiting to turn its granted S into X
    upgrading: Option<TxnId>,
}

impl RequestQueue {
    fn is_grantable(&self, txn_id: TxnId) -> bool {
        if self.upgrading == Some(txn_id) {
            return self
                .requests
                .iter()
                .all(|r| r.txn_id == txn_id || !r.granted);
        }
        if self.upgrading.is_some() {
            return false;
        }
        let Some(idx) = self.waiting_position(txn_id) else {
            return false;
        };
        let mode = self.requests[idx].mode;
        self.requests[..idx]
            .iter()
            .all(|r| r.mode.is_compatible_with(mode))
    }

    fn grant(&mut self, txn_id: TxnId) {
        if self.upgrading == Some(txn_id) {
            self.upgrading = None;
            match self.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                Some(request) => request.mode = LockMode::Exclusive,
                None => self.requests.insert(
                    0,
                    LockRequest {
                        txn_id,
                        mode: LockMode::Exclusive,
                        granted: true,
                    },
                ),
            }
        } else if let Some(idx) = self.waiting_position(txn_id) {
            self.requests[idx].granted = true;
        }
    }

    fn waiting_position(&self, txn_id: TxnId) -> Option<usize> {
        self.requests
            .iter()
            .position(|r| r.txn_id == txn_id && !r.granted)
    }

    fn waiters(&self) -> impl Iterator<Item = TxnId> + '_ {
        self.requests
            .iter()
            .filter(|r| !r.granted)
            .map(|r| r.txn_id)
            .chain(self.upgrading)
    }

    /// Transactions `txn_id` is waiting on in this queue
    fn blockers(&self, txn_id: TxnId) -> Vec<TxnId> {
        if self.upgrading == Some(txn_id) {
            return self
                .requests
                .iter()
                .filter(|r| r.granted && r.txn_id != txn_id)
                .map(|r| r.txn_id)
                .collect();
        }
        let Some(idx) = self.waiting_position(txn_id) else {
            return Vec::new();
        };
        let mode = self.requests[idx].mode;
        let mut blockers: Vec<TxnId> = self.requests[..idx]
            .iter()
            .filter(|r| !r.mode.is_compatible_with(mode))
            .map(|r| r.txn_id)
            .collect();
        blockers.extend(self.upgrading.filter(|upgrader| *upgrader != txn_id));
        blockers
    }

    fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.upgrading.is_none()
    }
}

#[derive(Debug, Default)]
struct LockTableState {
    queues: HashMap<Rid, RequestQueue>,
    /// Victims marked aborted that have not yet withdrawn their request
    victims: HashSet<TxnId>,
}

/// Lock table statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockTableStatistics {
    pub lock_waits: u64,
    pub deadlocks: u64,
    pub timeouts: u64,
    pub locked_rids: usize,
}

/// Bundled `LockManager` implementation
pub struct LockTable {
    state: Mutex<LockTableState>,
    granted: Condvar,
    registry: Arc<TransactionRegistry>,
    config: LockTableConfig,
    lock_waits: AtomicU64,
    deadlocks: AtomicU64,
    timeouts: AtomicU64,
}

impl LockTable {
    /// The registry is used to reach deadlock victims blocked on other threads
    pub fn new(config: LockTableConfig, registry: Arc<TransactionRegistry>) -> Self {
        Self {
            state: Mutex::new(LockTableState::default()),
            granted: Condvar::new(),
            registry,
            config,
            lock_waits: AtomicU64::new(0),
            deadlocks: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &LockTableConfig {
        &self.config
    }

    /// Granted locks on `rid`, in queue order
    pub fn lock_holders(&self, rid: Rid) -> Vec<(TxnId, LockMode)> {
        self.state
            .lock()
            .queues
            .get(&rid)
            .map(|queue| {
                queue
                    .requests
                    .iter()
                    .filter(|r| r.granted)
                    .map(|r| (r.txn_id, r.mode))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn statistics(&self) -> LockTableStatistics {
        LockTableStatistics {
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            deadlocks: self.deadlocks.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            locked_rids: self.state.lock().queues.len(),
        }
    }

    fn aborted_error(ctx: &TransactionContext) -> TxnError {
        TxnError::Aborted {
            txn_id: ctx.txn_id(),
            reason: ctx.abort_reason().unwrap_or(AbortReason::Explicit),
        }
    }

    fn check_can_lock(&self, ctx: &TransactionContext) -> TxnResult<()> {
        match ctx.state() {
            TransactionState::Growing => Ok(()),
            TransactionState::Aborted => Err(Self::aborted_error(ctx)),
            TransactionState::Shrinking => {
                log::warn!("{} requested a lock while shrinking", ctx.txn_id());
                ctx.set_aborted(AbortReason::LockOnShrinking);
                Err(Self::aborted_error(ctx))
            }
            TransactionState::Committed => Err(TxnError::StateViolation {
                txn_id: ctx.txn_id(),
                state: TransactionState::Committed,
            }),
        }
    }

    fn wait_for_grant(
        &self,
        state: &mut MutexGuard<'_, LockTableState>,
        ctx: &TransactionContext,
        rid: Rid,
        mode: LockMode,
    ) -> TxnResult<()> {
        let txn_id = ctx.txn_id();
        let deadline = self.config.wait_timeout().map(|timeout| Instant::now() + timeout);
        let mut waited = false;

        loop {
            if ctx.is_aborted() {
                self.withdraw(state, txn_id, rid);
                return Err(Self::aborted_error(ctx));
            }

            if let Some(queue) = state.queues.get_mut(&rid) {
                if queue.is_grantable(txn_id) {
                    queue.grant(txn_id);
                    if waited {
                        log::debug!("{} granted {} lock on {} after waiting", txn_id, mode, rid);
                    }
                    return Ok(());
                }
            }

            if !waited {
                waited = true;
                self.lock_waits.fetch_add(1, Ordering::Relaxed);
                log::debug!("{} waits for {} lock on {}", txn_id, mode, rid);
            }

            if self.config.deadlock_detection {
                if let Some(victim) = Self::find_victim(state, txn_id) {
                    self.abort_victim(state, ctx, victim);
                    continue;
                }
            }

            match deadline {
                Some(deadline) => {
                    let timed_out = self.granted.wait_until(state, deadline).timed_out();
                    let grantable = state
                        .queues
                        .get(&rid)
                        .is_some_and(|queue| queue.is_grantable(txn_id));
                    if timed_out && !grantable && !ctx.is_aborted() {
                        self.timeouts.fetch_add(1, Ordering::Relaxed);
                        log::warn!("{} timed out waiting for {} lock on {}", txn_id, mode, rid);
                        ctx.set_aborted(AbortReason::LockWaitTimeout);
                    }
                }
                None => self.granted.wait(state),
            }
        }
    }

    /// Remove a request that will never be granted
    fn withdraw(&self, state: &mut LockTableState, txn_id: TxnId, rid: Rid) {
        state.victims.remove(&txn_id);
        if let Some(queue) = state.queues.get_mut(&rid) {
            if queue.upgrading == Some(txn_id) {
                queue.upgrading = None;
            } else {
                queue.requests.retain(|r| r.txn_id != txn_id || r.granted);
            }
            if queue.is_idle() {
                state.queues.remove(&rid);
            }
        }
        self.granted.notify_all();
    }

    /// Youngest transaction on a wait-for cycle through `requester`
    fn find_victim(state: &LockTableState, requester: TxnId) -> Option<TxnId> {
        let mut graph: HashMap<TxnId, Vec<TxnId>> = HashMap::new();
        for queue in state.queues.values() {
            for waiter in queue.waiters() {
                if state.victims.contains(&waiter) {
                    continue;
                }
                let edges = graph.entry(waiter).or_default();
                edges.extend(
                    queue
                        .blockers(waiter)
                        .into_iter()
                        .filter(|holder| !state.victims.contains(holder)),
                );
            }
        }
        for edges in graph.values_mut() {
            edges.sort();
            edges.dedup();
        }

        let mut path = vec![requester];
        let mut visited = HashSet::from([requester]);
        if Self::reaches(&graph, requester, requester, &mut path, &mut visited) {
            path.into_iter().max()
        } else {
            None
        }
    }

    fn reaches(
        graph: &HashMap<TxnId, Vec<TxnId>>,
        from: TxnId,
        target: TxnId,
        path: &mut Vec<TxnId>,
        visited: &mut HashSet<TxnId>,
    ) -> bool {
        for &next in graph.get(&from).into_iter().flatten() {
            if next == target {
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if Self::reaches(graph, next, target, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    fn abort_victim(&self, state: &mut LockTableState, requester: &TransactionContext, victim: TxnId) {
        self.deadlocks.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "Deadlock detected while {} waits; aborting {}",
            requester.txn_id(),
            victim
        );

        if victim == requester.txn_id() {
            requester.set_aborted(AbortReason::Deadlock);
        } else if let Some(victim_ctx) = self.registry.lookup(victim) {
            victim_ctx.set_aborted(AbortReason::Deadlock);
            state.victims.insert(victim);
        } else {
            // victim is not reachable through the registry
            requester.set_aborted(AbortReason::Deadlock);
        }
        self.granted.notify_all();
    }

    fn upgrade(
        &self,
        state: &mut MutexGuard<'_, LockTableState>,
        ctx: &TransactionContext,
        rid: Rid,
    ) -> TxnResult<()> {
        let txn_id = ctx.txn_id();
        let queue = state.queues.entry(rid).or_default();
        if let Some(other) = queue.upgrading.filter(|other| *other != txn_id) {
            log::warn!("{} cannot upgrade {} while {} is upgrading", txn_id, rid, other);
            ctx.set_aborted(AbortReason::UpgradeConflict);
            return Err(Self::aborted_error(ctx));
        }
        queue.upgrading = Some(txn_id);

        self.wait_for_grant(state, ctx, rid, LockMode::Exclusive)?;
        ctx.add_exclusive_lock(rid);
        Ok(())
    }
}

impl LockManager for LockTable {
    fn lock_shared(&self, ctx: &TransactionContext, rid: Rid) -> TxnResult<()> {
        self.check_can_lock(ctx)?;
        if ctx.holds_lock(rid) {
            return Ok(());
        }

        let mut state = self.state.lock();
        state.queues.entry(rid).or_default().requests.push(LockRequest {
            txn_id: ctx.txn_id(),
            mode: LockMode::Shared,
            granted: false,
        });
        self.wait_for_grant(&mut state, ctx, rid, LockMode::Shared)?;
        ctx.add_shared_lock(rid);
        Ok(())
    }

    fn lock_exclusive(&self, ctx: &TransactionContext, rid: Rid) -> TxnResult<()> {
        self.check_can_lock(ctx)?;
        if ctx.is_exclusive_locked(rid) {
            return Ok(());
        }

        let mut state = self.state.lock();
        if ctx.is_shared_locked(rid) {
            return self.upgrade(&mut state, ctx, rid);
        }
        state.queues.entry(rid).or_default().requests.push(LockRequest {
            txn_id: ctx.txn_id(),
            mode: LockMode::Exclusive,
            granted: false,
        });
        self.wait_for_grant(&mut state, ctx, rid, LockMode::Exclusive)?;
        ctx.add_exclusive_lock(rid);
        Ok(())
    }

    fn lock_inserted(&self, ctx: &TransactionContext, rid: Rid) -> TxnResult<()> {
        self.check_can_lock(ctx)?;
        {
            let mut state = self.state.lock();
            let queue = state.queues.entry(rid).or_default();
            if queue.is_idle() {
                queue.requests.push(LockRequest {
                    txn_id: ctx.txn_id(),
                    mode: LockMode::Exclusive,
                    granted: true,
                });
                drop(state);
                ctx.add_exclusive_lock(rid);
                return Ok(());
            }
        }
        log::debug!("{} found contention on freshly inserted {}", ctx.txn_id(), rid);
        self.lock_exclusive(ctx, rid)
    }

    fn unlock(&self, ctx: &TransactionContext, rid: Rid) -> bool {
        let txn_id = ctx.txn_id();
        let released = {
            let mut state = self.state.lock();
            let released = match state.queues.get_mut(&rid) {
                Some(queue) => {
                    let released = queue
                        .requests
                        .iter()
                        .position(|r| r.txn_id == txn_id && r.granted)
                        .map(|idx| queue.requests.remove(idx));
                    if queue.is_idle() {
                        state.queues.remove(&rid);
                    }
                    released
                }
                None => None,
            };
            released
        };
        ctx.remove_lock(rid);

        let Some(request) = released else {
            return false;
        };
        if request.mode == LockMode::Exclusive || ctx.isolation_level().holds_shared_until_end() {
            ctx.set_shrinking();
        }
        log::debug!("{} released {} lock on {}", txn_id, request.mode, rid);
        self.granted.notify_all();
        true
    }
}
