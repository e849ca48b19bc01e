// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction error types

use crate::txn::state::{AbortReason, TransactionState, TxnId};
use thiserror::Error;

/// Errors surfaced by the transaction manager and its collaborators.
///
/// A tuple that cannot be read is not an error: `read` reports it as
/// `Ok(None)` and the caller moves on to the next candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxnError {
    #[error("Transaction {txn_id} aborted: {reason}")]
    Aborted { txn_id: TxnId, reason: AbortReason },

    #[error("Storage error in transaction {txn_id}: {reason}")]
    StorageError { txn_id: TxnId, reason: String },

    #[error("Transaction {txn_id} is {state}, operation not permitted")]
    StateViolation {
        txn_id: TxnId,
        state: TransactionState,
    },

    #[error("Transaction {0} not found")]
    UnknownTransaction(TxnId),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TxnError {
    /// True when the transaction can no longer make progress and the client
    /// has to discard its context.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TxnError::Aborted { .. } | TxnError::StorageError { .. }
        )
    }

    /// The abort reason, if this error reports an aborted transaction
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            TxnError::Aborted { reason, .. } => Some(*reason),
            TxnError::StorageError { .. } => Some(AbortReason::StorageFailure),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TxnError {
    fn from(error: serde_json::Error) -> Self {
        TxnError::Config(error.to_string())
    }
}

/// Result alias used throughout the crate
pub type TxnResult<T> = Result<T, TxnError>;
