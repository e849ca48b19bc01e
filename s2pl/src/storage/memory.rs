// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory table heap with tombstone deletes

use super::{Rid, TableHeap, Tuple};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of slots per page
const DEFAULT_SLOTS_PER_PAGE: u32 = 64;

#[derive(Debug, Clone)]
struct Slot {
    tuple: Tuple,
    deleted: bool,
}

/// In-memory table heap
///
/// RIDs are allocated from a monotonically increasing counter and never
/// reused, so a freshly inserted RID cannot be known to any other
/// transaction before the insert returns.
#[derive(Debug)]
pub struct MemoryTableHeap {
    slots: RwLock<HashMap<Rid, Slot>>,
    next_slot: AtomicU64,
    slots_per_page: u32,
    max_rows: Option<usize>,
    max_tuple_size: Option<usize>,
}

impl MemoryTableHeap {
    /// Create an unbounded heap
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_slot: AtomicU64::new(0),
            slots_per_page: DEFAULT_SLOTS_PER_PAGE,
            max_rows: None,
            max_tuple_size: None,
        }
    }

    /// Create a heap that rejects inserts beyond `max_rows` rows and writes
    /// of tuples larger than `max_tuple_size` bytes
    pub fn with_limits(max_rows: usize, max_tuple_size: usize) -> Self {
        Self {
            max_rows: Some(max_rows),
            max_tuple_size: Some(max_tuple_size),
            ..Self::new()
        }
    }

    /// Number of slots currently occupied, tombstoned ones included
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Whether `rid` carries a delete tombstone
    pub fn is_marked_deleted(&self, rid: Rid) -> bool {
        self.slots.read().get(&rid).is_some_and(|slot| slot.deleted)
    }

    /// Visible (non-tombstoned) tuples ordered by RID
    pub fn snapshot(&self) -> BTreeMap<Rid, Tuple> {
        self.slots
            .read()
            .iter()
            .filter(|(_, slot)| !slot.deleted)
            .map(|(rid, slot)| (*rid, slot.tuple.clone()))
            .collect()
    }

    fn fits(&self, tuple: &Tuple) -> bool {
        self.max_tuple_size
            .map_or(true, |limit| tuple.len() <= limit)
    }

    fn allocate_rid(&self) -> Rid {
        let n = self.next_slot.fetch_add(1, Ordering::SeqCst);
        let per_page = self.slots_per_page as u64;
        Rid::new((n / per_page) as u32, (n % per_page) as u32)
    }
}

impl Default for MemoryTableHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl TableHeap for MemoryTableHeap {
    fn get_tuple(&self, rid: Rid) -> Option<Tuple> {
        self.slots
            .read()
            .get(&rid)
            .filter(|slot| !slot.deleted)
            .map(|slot| slot.tuple.clone())
    }

    fn insert_tuple(&self, tuple: &Tuple) -> Option<Rid> {
        if !self.fits(tuple) {
            return None;
        }
        let mut slots = self.slots.write();
        if self.max_rows.is_some_and(|limit| slots.len() >= limit) {
            return None;
        }
        let rid = self.allocate_rid();
        slots.insert(
            rid,
            Slot {
                tuple: tuple.clone(),
                deleted: false,
            },
        );
        Some(rid)
    }

    fn update_tuple(&self, rid: Rid, tuple: &Tuple) -> bool {
        if !self.fits(tuple) {
            return false;
        }
        match self.slots.write().get_mut(&rid) {
            Some(slot) if !slot.deleted => {
                slot.tuple = tuple.clone();
                true
            }
            _ => false,
        }
    }

    fn mark_delete(&self, rid: Rid) -> bool {
        match self.slots.write().get_mut(&rid) {
            Some(slot) if !slot.deleted => {
                slot.deleted = true;
                true
            }
            _ => false,
        }
    }

    fn apply_delete(&self, rid: Rid) {
        self.slots.write().remove(&rid);
    }

    fn rollback_delete(&self, rid: Rid) {
        if let Some(slot) = self.slots.write().get_mut(&rid) {
            slot.deleted = false;
        }
    }
}
