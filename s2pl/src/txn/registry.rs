// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Registry of live transactions
//!
//! The registry never owns a context. It keeps `Weak` handles so a lookup
//! for a transaction whose client dropped every handle simply misses.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::context::TransactionContext;
use super::state::TxnId;

/// Concurrent map from transaction id to its context
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    contexts: RwLock<HashMap<TxnId, Weak<TransactionContext>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, ctx: &Arc<TransactionContext>) {
        self.contexts
            .write()
            .insert(ctx.txn_id(), Arc::downgrade(ctx));
    }

    /// Returns false if the transaction was not registered
    pub fn remove(&self, txn_id: TxnId) -> bool {
        self.contexts.write().remove(&txn_id).is_some()
    }

    /// `None` means the transaction already resolved
    pub fn lookup(&self, txn_id: TxnId) -> Option<Arc<TransactionContext>> {
        self.contexts.read().get(&txn_id).and_then(Weak::upgrade)
    }

    pub fn contains(&self, txn_id: TxnId) -> bool {
        self.lookup(txn_id).is_some()
    }

    /// Ids of registered transactions whose context is still alive, oldest first
    pub fn active_ids(&self) -> Vec<TxnId> {
        let mut ids: Vec<TxnId> = self
            .contexts
            .read()
            .iter()
            .filter(|(_, handle)| handle.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::IsolationLevel;
    use std::thread;

    fn context(id: u64) -> Arc<TransactionContext> {
        Arc::new(TransactionContext::new(
            TxnId::from_u64(id),
            IsolationLevel::ReadCommitted,
        ))
    }

    #[test]
    fn test_add_lookup_remove() {
        let registry = TransactionRegistry::new();
        let ctx = context(1);
        registry.add(&ctx);

        let found = registry.lookup(TxnId::from_u64(1)).unwrap();
        assert!(Arc::ptr_eq(&found, &ctx));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(TxnId::from_u64(1)));
        assert!(!registry.remove(TxnId::from_u64(1)));
        assert!(registry.lookup(TxnId::from_u64(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_context_is_not_returned() {
        let registry = TransactionRegistry::new();
        let ctx = context(9);
        registry.add(&ctx);
        drop(ctx);

        assert!(registry.lookup(TxnId::from_u64(9)).is_none());
        assert!(registry.active_ids().is_empty());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(TransactionRegistry::new());
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let contexts: Vec<_> = (0..50u64).map(|i| context(worker * 100 + i + 1)).collect();
                    for ctx in &contexts {
                        registry.add(ctx);
                    }
                    for ctx in &contexts[..25] {
                        assert!(registry.remove(ctx.txn_id()));
                    }
                    contexts
                })
            })
            .collect();

        let kept: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let ids = registry.active_ids();
        assert_eq!(ids.len(), 8 * 25);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        drop(kept);
    }
}
