// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution over the cache
//!
//! Reads go through [`QueryExecutor`], which serves fresh data from the cache,
//! coalesces concurrent fetches of one key and applies the refetch and retry
//! policies.

pub mod executor;
mod inflight;
pub mod observer;
pub mod policy;
pub mod source;

pub use executor::{ExecutorStats, QueryExecutor};
pub use observer::QueryObserver;
pub use policy::{QueryOptions, RefetchPolicy, RetryPolicy};
pub use source::QuerySource;
