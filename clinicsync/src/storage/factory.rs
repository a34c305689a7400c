// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Durable store factory
//!
//! Creates the storage driver selected by configuration.

use super::traits::DurableStore;
use super::types::{PersistenceResult, StorageType};
use std::path::Path;

/// Create a durable store based on configuration
///
/// # Arguments
/// * `storage_type` - The type of storage driver to create
/// * `path` - Filesystem path for disk-backed drivers (ignored for memory)
///
/// # Examples
/// ```ignore
/// use clinicsync::storage::{create_durable_store, StorageType};
///
/// let store = create_durable_store(StorageType::Sled, "./cache")?;
/// ```
pub fn create_durable_store<P: AsRef<Path>>(
    storage_type: StorageType,
    path: P,
) -> PersistenceResult<Box<dyn DurableStore>> {
    match storage_type {
        #[cfg(feature = "sled-backend")]
        StorageType::Sled => {
            use super::sled::SledStore;
            let store = SledStore::open(path)?;
            Ok(Box::new(store) as Box<dyn DurableStore>)
        }
        #[cfg(not(feature = "sled-backend"))]
        StorageType::Sled => {
            let _ = path;
            Err(super::types::PersistenceError::Unavailable(
                "clinicsync was built without the sled-backend feature".to_string(),
            ))
        }
        StorageType::Memory => {
            use super::memory::MemoryStore;
            let _ = path;
            Ok(Box::new(MemoryStore::new()) as Box<dyn DurableStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_store() {
        let store = create_durable_store(StorageType::Memory, "").unwrap();
        assert_eq!(store.storage_type(), StorageType::Memory);
    }

    #[cfg(feature = "sled-backend")]
    #[test]
    fn test_create_sled_store() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = create_durable_store(StorageType::Sled, temp_dir.path()).unwrap();
        assert_eq!(store.storage_type(), StorageType::Sled);
    }

    #[test]
    fn test_storage_type_parsing() {
        assert_eq!("SLED".parse::<StorageType>().unwrap(), StorageType::Sled);
        assert_eq!("memory".parse::<StorageType>().unwrap(), StorageType::Memory);
        assert!("rocksdb".parse::<StorageType>().is_err());
    }
}
