// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sled durable store implementation

use super::traits::DurableStore;
use super::types::{PersistenceError, PersistenceResult, StorageType};
use std::path::Path;

/// Name of the sled tree holding cache snapshots
const SNAPSHOT_TREE: &str = "query_cache";

/// Sled-backed durable store
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Open or create a sled database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        let db =
            sled::open(path).map_err(|e| PersistenceError::BackendSpecific(e.to_string()))?;
        let tree = db
            .open_tree(SNAPSHOT_TREE)
            .map_err(|e| PersistenceError::BackendSpecific(e.to_string()))?;
        Ok(SledStore { db, tree })
    }
}

impl DurableStore for SledStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        self.tree
            .get(key.as_bytes())
            .map_err(|e| PersistenceError::BackendSpecific(e.to_string()))
            .map(|opt| opt.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> PersistenceResult<()> {
        self.tree
            .insert(key.as_bytes(), value)
            .map_err(|e| PersistenceError::BackendSpecific(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> PersistenceResult<()> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| PersistenceError::BackendSpecific(e.to_string()))?;
        Ok(())
    }

    fn contains_key(&self, key: &str) -> PersistenceResult<bool> {
        self.tree
            .contains_key(key.as_bytes())
            .map_err(|e| PersistenceError::BackendSpecific(e.to_string()))
    }

    fn keys(&self) -> PersistenceResult<Vec<String>> {
        self.tree
            .iter()
            .keys()
            .map(|result| {
                result
                    .map(|k| String::from_utf8_lossy(&k).to_string())
                    .map_err(|e| PersistenceError::BackendSpecific(e.to_string()))
            })
            .collect()
    }

    fn flush(&self) -> PersistenceResult<()> {
        self.db
            .flush()
            .map_err(|e| PersistenceError::BackendSpecific(e.to_string()))?;
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Sled
    }
}
