// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache configuration and policies

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::query::{RefetchPolicy, RetryPolicy};
use crate::storage::StorageType;

/// Global cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default time a fetched entry stays fresh
    pub default_stale_after: Duration,

    /// Entries not written within this window are eligible for collection
    pub gc_after: Duration,

    /// How often the background collector runs
    pub gc_interval: Duration,

    /// Capacity of the change-notification channel
    pub event_capacity: usize,

    /// Read retry policy
    pub retry: RetryPolicy,

    /// Refetch policy for families without a registered policy
    pub default_refetch: RefetchPolicy,

    /// Maximum number of derivation hops followed by invalidation
    pub max_cascade_depth: usize,

    /// Durable snapshot settings
    pub persistence: PersistenceConfig,
}

/// Durable snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Fixed identifier the snapshot is stored under
    pub cache_identifier: String,

    /// Version buster; a snapshot written under another buster is discarded
    pub buster: String,

    /// Entries (and whole snapshots) older than this are dropped on restore
    pub max_age: Duration,

    /// Minimum spacing between autosave writes
    pub autosave_throttle: Duration,

    /// Durable store backend
    pub storage_type: StorageType,

    /// Directory of the durable store, for file-backed drivers
    pub path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            cache_identifier: "clinicsync-query-cache".to_string(),
            buster: crate::VERSION.to_string(),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            autosave_throttle: Duration::from_secs(1),
            storage_type: StorageType::default(),
            path: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_stale_after: Duration::from_secs(30),
            gc_after: Duration::from_secs(300), // 5 minutes
            gc_interval: Duration::from_secs(60),
            event_capacity: 256,
            retry: RetryPolicy::default(),
            default_refetch: RefetchPolicy::Blocking,
            max_cascade_depth: 3,
            persistence: PersistenceConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Configuration for clients that spend long stretches offline
    pub fn offline_first() -> Self {
        let mut config = Self::default();
        config.default_stale_after = Duration::from_secs(300);
        config.gc_after = Duration::from_secs(24 * 60 * 60);
        config.default_refetch = RefetchPolicy::StaleWhileRevalidate;
        config.persistence.max_age = Duration::from_secs(7 * 24 * 60 * 60);
        config
    }

    /// Configuration for screens that must always show server state
    pub fn realtime() -> Self {
        Self {
            default_stale_after: Duration::ZERO,
            gc_after: Duration::from_secs(60),
            gc_interval: Duration::from_secs(15),
            ..Self::default()
        }
    }

    /// Configuration for tests: no retries, no persistence throttling
    pub fn testing() -> Self {
        let mut config = Self::default();
        config.retry = RetryPolicy::none();
        config.persistence.storage_type = StorageType::Memory;
        config.persistence.autosave_throttle = Duration::ZERO;
        config
    }

    /// Load and validate a configuration from JSON
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate().map_err(SyncError::Configuration)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.event_capacity == 0 {
            return Err("Event capacity must be greater than zero".to_string());
        }

        if self.gc_interval.is_zero() {
            return Err("GC interval must be greater than zero".to_string());
        }

        if self.gc_after < self.default_stale_after {
            return Err(format!(
                "GC time ({:?}) is shorter than the default stale time ({:?})",
                self.gc_after, self.default_stale_after
            ));
        }

        if self.max_cascade_depth == 0 {
            return Err("Cascade depth must be at least 1".to_string());
        }

        self.retry.validate()?;

        if self.persistence.cache_identifier.trim().is_empty() {
            return Err("Cache identifier must not be empty".to_string());
        }

        if self.persistence.buster.trim().is_empty() {
            return Err("Cache buster must not be empty".to_string());
        }

        if self.persistence.storage_type == StorageType::Sled && self.persistence.path.is_none() {
            return Err("Sled persistence requires a path".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        let mut default = CacheConfig::default();
        default.persistence.path = Some(PathBuf::from("/tmp/clinicsync"));
        assert!(default.validate().is_ok());

        assert!(CacheConfig::testing().validate().is_ok());

        let mut offline = CacheConfig::offline_first();
        offline.persistence.storage_type = StorageType::Memory;
        assert!(offline.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = CacheConfig::testing();
        config.gc_after = Duration::from_secs(1);
        assert!(config.validate().unwrap_err().contains("GC time"));

        let mut config = CacheConfig::testing();
        config.persistence.buster = " ".to_string();
        assert!(config.validate().is_err());

        let config = CacheConfig::default();
        assert!(config.validate().unwrap_err().contains("path"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "max_cascade_depth": 5,
            "persistence": { "buster": "v2", "storage_type": "memory" }
        }"#;
        let config = CacheConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_cascade_depth, 5);
        assert_eq!(config.persistence.buster, "v2");
        assert_eq!(config.persistence.cache_identifier, "clinicsync-query-cache");
        assert_eq!(config.gc_after, Duration::from_secs(300));

        assert!(CacheConfig::from_json_str(r#"{"event_capacity": 0}"#).is_err());
    }
}
