// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Durable storage backends
//!
//! This module provides the trait-based abstraction over the durable key/value
//! collaborator that holds whole-cache snapshots, so different storage engines
//! can be used interchangeably.
//!
//! # Architecture
//!
//! ```text
//! CachePersister (snapshot encoding, buster, max age)
//!     ↓
//! DurableStore (get / set / delete of raw bytes)
//!     ↓
//! Concrete Implementations (Sled, Memory)
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! use clinicsync::storage::{create_durable_store, StorageType};
//!
//! let store = create_durable_store(StorageType::Sled, "./cache")?;
//! store.set("clinicsync-query-cache", b"...")?;
//! let bytes = store.get("clinicsync-query-cache")?;
//! store.delete("clinicsync-query-cache")?;
//! ```

// Core modules
pub mod factory;
pub mod traits;
pub mod types;

// Driver implementations
pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled;

// Public API re-exports
pub use factory::create_durable_store;
pub use memory::MemoryStore;
pub use traits::DurableStore;
pub use types::{PersistenceError, PersistenceResult, StorageType};
