// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query cache
//!
//! # Architecture
//!
//! ```text
//! QueryExecutor / MutationCoordinator
//!     ↓
//! CacheStore (entries, revisions, subscriptions, GC)
//!     ↓                         ↓
//! InvalidationGraph        CachePersister → DurableStore
//! ```
//!
//! Keys are built through the [`keys`] registry so that related views share
//! prefixes and can be invalidated together.

pub mod cache_config;
pub mod domain;
pub mod entry;
pub mod events;
pub mod invalidation;
pub mod keys;
pub mod persistence;
pub mod query_key;
pub mod snapshot;
pub mod store;

pub use cache_config::{CacheConfig, PersistenceConfig};
pub use domain::MutationDomain;
pub use entry::{CacheEntry, CacheStatus, Payload};
pub use events::{CacheEvent, CacheEventKind, KeyFilter, Subscription};
pub use invalidation::{
    InvalidationGraph, InvalidationReport, InvalidationRule, InvalidationScope, InvalidationStats,
};
pub use persistence::{CachePersister, DiscardReason, PersistedCache, RestoreOutcome};
pub use query_key::{KeySegment, QueryKey};
pub use snapshot::CacheSnapshot;
pub use store::{CacheStore, CacheStoreStats};
