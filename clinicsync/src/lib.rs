// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! ClinicSync - client-side data synchronization core for clinic management
//!
//! ClinicSync keeps a key-addressed cache of server-derived records consistent
//! with a backend API while the UI reads and writes through it.
//!
//! # Features
//!
//! - **Query Cache**: Hierarchical query keys, freshness tracking, subscriptions
//! - **Request Coalescing**: Concurrent reads of one key share a single fetch
//! - **Optimistic Mutations**: Snapshot, speculative apply, commit-or-rollback
//! - **Dependency Invalidation**: Domain-driven invalidation of related views
//! - **Durable Snapshots**: Versioned, checksummed cache persistence (Sled)
//! - **Scheduling**: Appointment canonicalization, day buckets, slot suggestions
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use clinicsync::{keys, CacheConfig, CacheStore, QueryExecutor, QueryOptions};
//!
//! let store = Arc::new(CacheStore::new(CacheConfig::default()));
//! let executor = QueryExecutor::new(store.clone());
//!
//! let today = executor
//!     .query(keys::dashboard::today_appointments(), || api.today(), QueryOptions::default())
//!     .await?;
//! ```

// Public modules - exposed to external users
pub mod api;
pub mod cache;
pub mod error;
pub mod mutation;
pub mod query;
pub mod scheduling;
pub mod storage;

// Re-export the public API
pub use api::{ApiEnvelope, ApiErrorBody};
pub use cache::{
    keys, CacheConfig, CacheEntry, CacheEvent, CacheEventKind, CacheSnapshot, CacheStatus,
    CacheStore, CachePersister, InvalidationGraph, InvalidationScope, KeyFilter, KeySegment,
    MutationDomain, Payload, QueryKey, Subscription,
};
pub use error::{SyncError, SyncResult};
pub use mutation::{MutationCoordinator, MutationOutcome, MutationRequest};
pub use query::{QueryExecutor, QueryObserver, QueryOptions, QuerySource, RefetchPolicy, RetryPolicy};
pub use scheduling::{
    BusinessHours, CanonicalAppointment, DayIndex, RawAppointment, Rejection, SchedulingConfig,
    SchedulingResolver, SlotCandidate,
};
pub use storage::{create_durable_store, DurableStore, StorageType};

/// ClinicSync version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ClinicSync crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
