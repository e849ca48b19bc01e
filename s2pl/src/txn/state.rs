// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction identifiers and lifecycle states
//!
//! A transaction moves through the two-phase locking phases
//! `Growing -> Shrinking` and ends in exactly one of the terminal states
//! `Committed` or `Aborted`.

use serde::{Deserialize, Serialize};

/// Unique identifier for a transaction
///
/// Identifiers are handed out by the transaction manager from an atomic
/// counter, so a larger id always means a younger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Get the underlying ID value
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Create TxnId from a raw u64
    pub fn from_u64(id: u64) -> Self {
        TxnId(id)
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Two-phase locking lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Locks may be acquired
    Growing,
    /// A lock has been released outside commit/abort; no new locks allowed
    Shrinking,
    /// Terminal: transaction committed
    Committed,
    /// Terminal: transaction aborted (possibly still rolling back)
    Aborted,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Growing => "GROWING",
            TransactionState::Shrinking => "SHRINKING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::Aborted => "ABORTED",
        }
    }

    /// Committed and aborted transactions accept no further operations
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }

    /// Whether the transaction may still acquire locks
    pub fn can_acquire_locks(&self) -> bool {
        *self == TransactionState::Growing
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a transaction ended up aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    /// The client asked for the abort
    Explicit,
    /// Chosen as the victim to break a wait-for cycle
    Deadlock,
    /// Waited longer than the configured lock timeout
    LockWaitTimeout,
    /// Requested a lock after entering the shrinking phase
    LockOnShrinking,
    /// Another transaction is already upgrading the same record
    UpgradeConflict,
    /// The table heap rejected a write
    StorageFailure,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::Explicit => "explicit abort",
            AbortReason::Deadlock => "deadlock victim",
            AbortReason::LockWaitTimeout => "lock wait timeout",
            AbortReason::LockOnShrinking => "lock requested while shrinking",
            AbortReason::UpgradeConflict => "concurrent lock upgrade",
            AbortReason::StorageFailure => "storage failure",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
