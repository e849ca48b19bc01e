// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction manager and lock table configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{TxnError, TxnResult};
use crate::txn::IsolationLevel;

/// Transaction manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxnManagerConfig {
    /// Isolation level used by `begin_default`
    pub default_isolation_level: IsolationLevel,

    /// First transaction id handed out (must be non-zero)
    pub first_txn_id: u64,

    /// Settings for the bundled lock table
    pub lock_table: LockTableConfig,
}

/// Lock table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockTableConfig {
    /// Run wait-for cycle detection whenever a request has to wait
    pub deadlock_detection: bool,

    /// Abort a waiter after this many milliseconds (None = wait forever)
    pub wait_timeout_ms: Option<u64>,
}

impl Default for TxnManagerConfig {
    fn default() -> Self {
        Self {
            default_isolation_level: IsolationLevel::ReadCommitted,
            first_txn_id: 1,
            lock_table: LockTableConfig::default(),
        }
    }
}

impl Default for LockTableConfig {
    fn default() -> Self {
        Self {
            deadlock_detection: true,
            wait_timeout_ms: None,
        }
    }
}

impl TxnManagerConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> TxnResult<Self> {
        let config: TxnManagerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TxnResult<()> {
        if self.first_txn_id == 0 {
            return Err(TxnError::Config(
                "first_txn_id must be greater than zero".to_string(),
            ));
        }
        self.lock_table.validate()
    }
}

impl LockTableConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> TxnResult<()> {
        if self.wait_timeout_ms == Some(0) {
            return Err(TxnError::Config(
                "wait_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        if !self.deadlock_detection && self.wait_timeout_ms.is_none() {
            log::warn!("Lock table runs without deadlock detection or wait timeout");
        }
        Ok(())
    }
}
