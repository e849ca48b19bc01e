// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction isolation levels and the lock policy each one implies
//!
//! Under strict two-phase locking the isolation level only changes how
//! shared locks are handled on reads. Writes always take exclusive locks that
//! are held until commit or abort.
//!
//! | Level            | S lock before read | S lock after read      |
//! |------------------|--------------------|------------------------|
//! | READ UNCOMMITTED | none               | -                      |
//! | READ COMMITTED   | acquire            | release immediately    |
//! | REPEATABLE READ  | acquire            | hold until commit      |
//! | SERIALIZABLE     | acquire            | hold until commit      |

use serde::{Deserialize, Serialize};

/// ANSI isolation level requested at `begin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// Reads take no lock and may see uncommitted writes
    ReadUncommitted,
    /// Reads wait for writers, then drop their shared lock
    #[default]
    ReadCommitted,
    /// Shared locks are kept until the transaction ends
    RepeatableRead,
    /// REPEATABLE READ plus predicate locks, when the lock manager has them
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether a read must take a shared lock before fetching the tuple
    pub fn locks_on_read(&self) -> bool {
        !matches!(self, IsolationLevel::ReadUncommitted)
    }

    /// Whether the shared lock taken for a read is dropped right after the fetch
    pub fn releases_shared_after_read(&self) -> bool {
        matches!(self, IsolationLevel::ReadCommitted)
    }

    /// Whether shared locks survive until commit/abort
    pub fn holds_shared_until_end(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }

    /// Whether reads and writes also take predicate (range) locks
    pub fn requires_range_locks(&self) -> bool {
        matches!(self, IsolationLevel::Serializable)
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "READ UNCOMMITTED" | "READ_UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" | "READ_COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" | "REPEATABLE_READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(format!("Unknown isolation level: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lock_policy() {
        assert!(!IsolationLevel::ReadUncommitted.locks_on_read());
        assert!(IsolationLevel::ReadCommitted.locks_on_read());
        assert!(IsolationLevel::ReadCommitted.releases_shared_after_read());
        assert!(!IsolationLevel::RepeatableRead.releases_shared_after_read());

        assert!(IsolationLevel::RepeatableRead.holds_shared_until_end());
        assert!(IsolationLevel::Serializable.holds_shared_until_end());
        assert!(!IsolationLevel::ReadCommitted.holds_shared_until_end());

        assert!(IsolationLevel::Serializable.requires_range_locks());
        assert!(!IsolationLevel::RepeatableRead.requires_range_locks());
    }

    #[test]
    fn test_isolation_level_parsing() {
        assert_eq!(
            "READ COMMITTED".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "repeatable_read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert!("SNAPSHOT".parse::<IsolationLevel>().is_err());
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_isolation_level_serde_names() {
        let json = serde_json::to_string(&IsolationLevel::RepeatableRead).unwrap();
        assert_eq!(json, "\"REPEATABLE_READ\"");
        let parsed: IsolationLevel = serde_json::from_str("\"READ_UNCOMMITTED\"").unwrap();
        assert_eq!(parsed, IsolationLevel::ReadUncommitted);
    }
}
