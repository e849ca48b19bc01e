// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hooks for recovery log writers
//!
//! The transaction manager does not define a log format. It only tells a
//! sink when a transaction begins and when it resolves. `on_commit` and
//! `on_abort` run after the commit/abort actions and before any lock is
//! released.

use super::isolation::IsolationLevel;
use super::state::TxnId;

pub trait LogSink: Send + Sync {
    fn on_begin(&self, _txn_id: TxnId, _isolation_level: IsolationLevel) {}

    fn on_commit(&self, _txn_id: TxnId) {}

    fn on_abort(&self, _txn_id: TxnId) {}
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {}
