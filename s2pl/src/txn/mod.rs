// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction management under strict two-phase locking
//!
//! # Features
//! - Transaction lifecycle (begin, commit, abort) with exactly-once draining
//! - All four ANSI isolation levels, expressed as shared-lock policies
//! - Undo actions recorded per write and replayed LIFO on abort
//! - Deferred commit actions (physical deletes, external hooks)
//! - A registry of live transactions for lock managers that need to reach
//!   a deadlock victim

pub mod context;
pub mod isolation;
pub mod log;
pub mod manager;
pub mod registry;
pub mod sink;
pub mod state;

pub use context::TransactionContext;
pub use isolation::IsolationLevel;
pub use self::log::{AbortAction, ActionHook, CommitAction};
pub use manager::{TransactionStatistics, TwoPhaseLockManager};
pub use registry::TransactionRegistry;
pub use sink::{LogSink, NoopLogSink};
pub use state::{AbortReason, TransactionState, TxnId};
