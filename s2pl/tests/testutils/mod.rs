// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Test utilities for s2pl integration tests
//!
//! - TestFixture: a transaction manager, its lock table and one seeded table
//! - RecordingHeap: table heap wrapper that records every storage call

#![allow(dead_code)]

pub mod recording_heap;
pub mod test_fixture;
