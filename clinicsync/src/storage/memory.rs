// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory durable store for testing

use super::traits::DurableStore;
use super::types::{PersistenceResult, StorageType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory store; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> PersistenceResult<()> {
        self.data.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> PersistenceResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn contains_key(&self, key: &str) -> PersistenceResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn keys(&self) -> PersistenceResult<Vec<String>> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn flush(&self) -> PersistenceResult<()> {
        // No-op for memory storage
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_data() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.set("snapshot", b"payload").unwrap();
        assert_eq!(other.get("snapshot").unwrap(), Some(b"payload".to_vec()));

        other.delete("snapshot").unwrap();
        assert!(store.is_empty());
        // Deleting a missing key is fine
        store.delete("snapshot").unwrap();
    }
}
