// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Table heap interface consumed by the transaction manager
//!
//! This module provides:
//! - Record identifiers (`Rid`) and tuple images (`Tuple`)
//! - The `TableHeap` trait the transaction manager drives
//! - `TableInfo`, the handle passed to every data operation
//! - An in-memory heap with tombstone deletes

pub mod memory;

pub use memory::MemoryTableHeap;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Record identifier: page id plus slot number
///
/// Ordered by page, then slot. Packs into a single `u64` for logging and
/// external tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rid {
    page_id: u32,
    slot: u32,
}

impl Rid {
    pub const fn new(page_id: u32, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn page_id(&self) -> u32 {
        self.page_id
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn as_u64(&self) -> u64 {
        ((self.page_id as u64) << 32) | self.slot as u64
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            page_id: (value >> 32) as u32,
            slot: value as u32,
        }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// An owned tuple image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tuple(Vec<u8>);

impl Tuple {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Tuple(data.into())
    }

    pub fn data(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for Tuple {
    fn from(value: &str) -> Self {
        Tuple(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Tuple {
    fn from(value: Vec<u8>) -> Self {
        Tuple(value)
    }
}

/// Table object identifier
pub type TableOid = u32;

/// Storage operations the transaction manager needs from a table heap
///
/// Every call may block on I/O. None of them take locks on behalf of a
/// transaction; concurrency control is the lock manager's job.
pub trait TableHeap: Send + Sync {
    /// Fetch the tuple at `rid`. `None` means the row is missing, deleted or
    /// unreadable, which callers treat as "skip".
    fn get_tuple(&self, rid: Rid) -> Option<Tuple>;

    /// Place a new tuple and return its location, or `None` if the heap
    /// rejected it.
    fn insert_tuple(&self, tuple: &Tuple) -> Option<Rid>;

    /// Overwrite the live tuple at `rid`.
    fn update_tuple(&self, rid: Rid, tuple: &Tuple) -> bool;

    /// Set the delete tombstone on a live tuple.
    fn mark_delete(&self, rid: Rid) -> bool;

    /// Physically remove a tuple. Called at commit for deletes and during
    /// rollback of inserts.
    fn apply_delete(&self, rid: Rid);

    /// Clear the delete tombstone.
    fn rollback_delete(&self, rid: Rid);
}

/// A table handle passed to every data operation
pub struct TableInfo {
    oid: TableOid,
    name: String,
    heap: Arc<dyn TableHeap>,
}

impl TableInfo {
    pub fn new(oid: TableOid, name: impl Into<String>, heap: Arc<dyn TableHeap>) -> Self {
        Self {
            oid,
            name: name.into(),
            heap,
        }
    }

    pub fn oid(&self) -> TableOid {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn heap(&self) -> &dyn TableHeap {
        self.heap.as_ref()
    }
}

impl std::fmt::Debug for TableInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableInfo")
            .field("oid", &self.oid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
