// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Table heap that records the calls made against it

use parking_lot::Mutex;
use s2pl::{MemoryTableHeap, Rid, TableHeap, Tuple};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapCall {
    Get(Rid),
    Insert(Rid),
    Update(Rid, Tuple),
    MarkDelete(Rid),
    ApplyDelete(Rid),
    RollbackDelete(Rid),
}

/// Wraps a `MemoryTableHeap` and logs each call in order
#[derive(Default)]
pub struct RecordingHeap {
    inner: MemoryTableHeap,
    calls: Mutex<Vec<HeapCall>>,
}

impl RecordingHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryTableHeap {
        &self.inner
    }

    pub fn calls(&self) -> Vec<HeapCall> {
        self.calls.lock().clone()
    }

    /// Calls that change storage, skipping reads
    pub fn writes(&self) -> Vec<HeapCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| !matches!(call, HeapCall::Get(_)))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: HeapCall) {
        self.calls.lock().push(call);
    }
}

impl TableHeap for RecordingHeap {
    fn get_tuple(&self, rid: Rid) -> Option<Tuple> {
        self.record(HeapCall::Get(rid));
        self.inner.get_tuple(rid)
    }

    fn insert_tuple(&self, tuple: &Tuple) -> Option<Rid> {
        let rid = self.inner.insert_tuple(tuple)?;
        self.record(HeapCall::Insert(rid));
        Some(rid)
    }

    fn update_tuple(&self, rid: Rid, tuple: &Tuple) -> bool {
        self.record(HeapCall::Update(rid, tuple.clone()));
        self.inner.update_tuple(rid, tuple)
    }

    fn mark_delete(&self, rid: Rid) -> bool {
        self.record(HeapCall::MarkDelete(rid));
        self.inner.mark_delete(rid)
    }

    fn apply_delete(&self, rid: Rid) {
        self.record(HeapCall::ApplyDelete(rid));
        self.inner.apply_delete(rid)
    }

    fn rollback_delete(&self, rid: Rid) {
        self.record(HeapCall::RollbackDelete(rid));
        self.inner.rollback_delete(rid)
    }
}
