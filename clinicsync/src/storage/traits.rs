// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Durable store trait
//!
//! All storage drivers implement this trait so the cache persister can treat
//! the engine as an opaque byte store.

use super::types::{PersistenceResult, StorageType};

/// Byte-oriented durable key/value store
///
/// Operations are blocking; async callers run them on the blocking pool.
pub trait DurableStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> PersistenceResult<Option<Vec<u8>>>;

    /// Insert or overwrite a value
    fn set(&self, key: &str, value: &[u8]) -> PersistenceResult<()>;

    /// Remove a key; removing a missing key is not an error
    fn delete(&self, key: &str) -> PersistenceResult<()>;

    /// Check if a key exists
    fn contains_key(&self, key: &str) -> PersistenceResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List stored keys
    fn keys(&self) -> PersistenceResult<Vec<String>>;

    /// Flush any pending writes to disk
    fn flush(&self) -> PersistenceResult<()>;

    /// Get storage type
    fn storage_type(&self) -> StorageType;
}

// Helper implementation for Box<dyn DurableStore>
impl DurableStore for Box<dyn DurableStore> {
    fn get(&self, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> PersistenceResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> PersistenceResult<()> {
        (**self).delete(key)
    }

    fn contains_key(&self, key: &str) -> PersistenceResult<bool> {
        (**self).contains_key(key)
    }

    fn keys(&self) -> PersistenceResult<Vec<String>> {
        (**self).keys()
    }

    fn flush(&self) -> PersistenceResult<()> {
        (**self).flush()
    }

    fn storage_type(&self) -> StorageType {
        (**self).storage_type()
    }
}
