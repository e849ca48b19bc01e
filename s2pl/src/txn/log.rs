// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rollback and commit actions recorded by a transaction
//!
//! Actions are tagged variants rather than closures so the manager can
//! interpret them at commit/abort time. `Custom` variants exist for
//! collaborators outside the table heap (index fixups, log flush hooks).

use std::sync::Arc;

use crate::storage::{Rid, TableInfo, Tuple};

/// Externally supplied action body. An `Err` is logged and absorbed.
pub type ActionHook = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// Represents a write that can be undone
pub enum AbortAction {
    /// A tuple was inserted - to undo, delete it physically
    Insert { table: Arc<TableInfo>, rid: Rid },
    /// A tuple was overwritten - to undo, restore the prior image
    Update {
        table: Arc<TableInfo>,
        rid: Rid,
        prior_image: Tuple,
    },
    /// A tuple was tombstoned - to undo, clear the tombstone
    Delete { table: Arc<TableInfo>, rid: Rid },
    /// Caller-provided undo step
    Custom {
        description: String,
        hook: ActionHook,
    },
}

impl AbortAction {
    /// The record this action touches, if any
    pub fn rid(&self) -> Option<Rid> {
        match self {
            AbortAction::Insert { rid, .. }
            | AbortAction::Update { rid, .. }
            | AbortAction::Delete { rid, .. } => Some(*rid),
            AbortAction::Custom { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AbortAction::Insert { .. } => "undo-insert",
            AbortAction::Update { .. } => "undo-update",
            AbortAction::Delete { .. } => "undo-delete",
            AbortAction::Custom { .. } => "custom",
        }
    }

    /// Apply the inverse operation to storage
    pub(crate) fn undo(self) -> Result<(), String> {
        match self {
            AbortAction::Insert { table, rid } => {
                let heap = table.heap();
                if !heap.mark_delete(rid) {
                    return Err(format!(
                        "cannot tombstone inserted tuple {} in table {}",
                        rid,
                        table.name()
                    ));
                }
                heap.apply_delete(rid);
                Ok(())
            }
            AbortAction::Update {
                table,
                rid,
                prior_image,
            } => {
                if table.heap().update_tuple(rid, &prior_image) {
                    Ok(())
                } else {
                    Err(format!(
                        "cannot restore prior image of {} in table {}",
                        rid,
                        table.name()
                    ))
                }
            }
            AbortAction::Delete { table, rid } => {
                table.heap().rollback_delete(rid);
                Ok(())
            }
            AbortAction::Custom { description, hook } => {
                hook().map_err(|e| format!("{}: {}", description, e))
            }
        }
    }
}

impl std::fmt::Debug for AbortAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortAction::Insert { table, rid } => f
                .debug_struct("Insert")
                .field("table", &table.oid())
                .field("rid", rid)
                .finish(),
            AbortAction::Update {
                table,
                rid,
                prior_image,
            } => f
                .debug_struct("Update")
                .field("table", &table.oid())
                .field("rid", rid)
                .field("prior_image", prior_image)
                .finish(),
            AbortAction::Delete { table, rid } => f
                .debug_struct("Delete")
                .field("table", &table.oid())
                .field("rid", rid)
                .finish(),
            AbortAction::Custom { description, .. } => f
                .debug_struct("Custom")
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}

/// Work deferred until the transaction commits
pub enum CommitAction {
    /// Physically remove a tuple tombstoned by this transaction
    ApplyDelete { table: Arc<TableInfo>, rid: Rid },
    /// Caller-provided commit step
    Custom {
        description: String,
        hook: ActionHook,
    },
}

impl CommitAction {
    pub fn kind(&self) -> &'static str {
        match self {
            CommitAction::ApplyDelete { .. } => "apply-delete",
            CommitAction::Custom { .. } => "custom",
        }
    }

    pub(crate) fn apply(self) -> Result<(), String> {
        match self {
            CommitAction::ApplyDelete { table, rid } => {
                table.heap().apply_delete(rid);
                Ok(())
            }
            CommitAction::Custom { description, hook } => {
                hook().map_err(|e| format!("{}: {}", description, e))
            }
        }
    }
}

impl std::fmt::Debug for CommitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitAction::ApplyDelete { table, rid } => f
                .debug_struct("ApplyDelete")
                .field("table", &table.oid())
                .field("rid", rid)
                .finish(),
            CommitAction::Custom { description, .. } => f
                .debug_struct("Custom")
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}
