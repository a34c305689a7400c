// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Whole-cache snapshots in a durable key/value store
//!
//! Layout of the stored value:
//!
//! ```text
//! <crc32 of body, 8 hex digits>\n<body: {"buster", "savedAt", "entries": [...]}>
//! ```
//!
//! A snapshot written under another buster, failing its checksum or older
//! than the configured maximum age is discarded as a whole. Individual
//! entries older than the maximum age are dropped.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::cache_config::PersistenceConfig;
use super::entry::{elapsed_between, CacheEntry, CacheStatus};
use super::events::KeyFilter;
use super::store::CacheStore;
use crate::error::{SyncError, SyncResult};
use crate::storage::{create_durable_store, DurableStore, PersistenceError, StorageType};

/// Decoded snapshot body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCache {
    pub buster: String,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<CacheEntry>,
}

/// Why a stored snapshot was thrown away
#[derive(Debug, Clone, PartialEq)]
pub enum DiscardReason {
    BusterMismatch { found: String, expected: String },
    Corrupted(String),
    Expired,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscardReason::BusterMismatch { found, expected } => {
                write!(f, "buster mismatch (found {}, expected {})", found, expected)
            }
            DiscardReason::Corrupted(detail) => write!(f, "corrupted ({})", detail),
            DiscardReason::Expired => write!(f, "older than max age"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// Nothing was stored
    Missing,
    Restored { entries: usize, dropped: usize },
    Discarded(DiscardReason),
}

/// Encode a snapshot body with its checksum prefix
pub fn encode_snapshot(snapshot: &PersistedCache) -> SyncResult<Vec<u8>> {
    let body = serde_json::to_vec(snapshot)?;
    let mut bytes = format!("{:08x}\n", crc32fast::hash(&body)).into_bytes();
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Verify the checksum and decode a snapshot body
pub fn decode_snapshot(bytes: &[u8]) -> Result<PersistedCache, PersistenceError> {
    let split = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| PersistenceError::Corrupted("missing checksum header".to_string()))?;
    let (header, body) = (&bytes[..split], &bytes[split + 1..]);

    let expected = std::str::from_utf8(header)
        .ok()
        .and_then(|h| u32::from_str_radix(h.trim(), 16).ok())
        .ok_or_else(|| PersistenceError::Corrupted("unreadable checksum header".to_string()))?;
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(PersistenceError::Corrupted(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            expected, actual
        )));
    }

    Ok(serde_json::from_slice(body)?)
}

/// Saves and restores a [`CacheStore`] through a [`DurableStore`]
pub struct CachePersister {
    store: Arc<CacheStore>,
    durable: Arc<dyn DurableStore>,
    config: PersistenceConfig,
}

impl CachePersister {
    pub fn new(store: Arc<CacheStore>, durable: Arc<dyn DurableStore>) -> Self {
        let config = store.config().persistence.clone();
        Self {
            store,
            durable,
            config,
        }
    }

    /// Open the durable store described by the cache configuration
    pub fn open(store: Arc<CacheStore>) -> SyncResult<Self> {
        let config = store.config().persistence.clone();
        let durable = match (&config.path, config.storage_type) {
            (_, StorageType::Memory) => create_durable_store(StorageType::Memory, "")?,
            (Some(path), storage_type) => create_durable_store(storage_type, path)?,
            (None, storage_type) => {
                return Err(SyncError::Configuration(format!(
                    "{} persistence requires a path",
                    storage_type
                )))
            }
        };
        Ok(Self::new(store, Arc::from(durable)))
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Snapshot of the current store contents
    ///
    /// Entries without data are skipped; in-flight and failed entries are
    /// stored as stale.
    pub fn capture(&self) -> PersistedCache {
        let entries = self
            .store
            .entries()
            .into_iter()
            .filter(CacheEntry::has_data)
            .map(normalize_status)
            .collect();
        PersistedCache {
            buster: self.config.buster.clone(),
            saved_at: Utc::now(),
            entries,
        }
    }

    /// Write the whole store under the cache identifier
    pub async fn persist(&self) -> SyncResult<usize> {
        let snapshot = self.capture();
        let count = snapshot.entries.len();
        let bytes = encode_snapshot(&snapshot)?;

        let durable = self.durable.clone();
        let id = self.config.cache_identifier.clone();
        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            durable.set(&id, &bytes)?;
            durable.flush()
        })
        .await??;

        debug!("Persisted {} cache entries", count);
        Ok(count)
    }

    /// Load the stored snapshot into the cache
    ///
    /// An unusable snapshot is deleted and the cache starts empty.
    pub async fn restore(&self) -> SyncResult<RestoreOutcome> {
        let durable = self.durable.clone();
        let id = self.config.cache_identifier.clone();
        let bytes = tokio::task::spawn_blocking(move || durable.get(&id)).await??;

        let outcome = match bytes {
            Some(bytes) => self.apply(&bytes, Utc::now()),
            None => RestoreOutcome::Missing,
        };

        match &outcome {
            RestoreOutcome::Discarded(reason) => {
                warn!("Discarding persisted cache: {}", reason);
                self.discard().await?;
            }
            RestoreOutcome::Restored { entries, dropped } => {
                info!(
                    "Restored {} cache entries ({} expired or empty entries dropped)",
                    entries, dropped
                );
            }
            RestoreOutcome::Missing => debug!("No persisted cache found"),
        }
        Ok(outcome)
    }

    /// Apply stored bytes as of `now`
    pub fn apply(&self, bytes: &[u8], now: DateTime<Utc>) -> RestoreOutcome {
        let snapshot = match decode_snapshot(bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => return RestoreOutcome::Discarded(DiscardReason::Corrupted(e.to_string())),
        };

        if snapshot.buster != self.config.buster {
            return RestoreOutcome::Discarded(DiscardReason::BusterMismatch {
                found: snapshot.buster,
                expected: self.config.buster.clone(),
            });
        }

        if elapsed_between(snapshot.saved_at, now) > self.config.max_age {
            return RestoreOutcome::Discarded(DiscardReason::Expired);
        }

        let mut restored = 0;
        let mut dropped = 0;
        for entry in snapshot.entries {
            // Entries never fetched are aged from their last write
            let written_at = entry.fetched_at.unwrap_or(entry.updated_at);
            let expired = elapsed_between(written_at, now) > self.config.max_age;
            if expired || !entry.has_data() {
                dropped += 1;
                continue;
            }
            let mut entry = normalize_status(entry);
            // Restored entries start a fresh garbage-collection window
            entry.updated_at = now;
            self.store.set_entry(entry);
            restored += 1;
        }

        RestoreOutcome::Restored {
            entries: restored,
            dropped,
        }
    }

    /// Delete the stored snapshot
    pub async fn discard(&self) -> SyncResult<()> {
        let durable = self.durable.clone();
        let id = self.config.cache_identifier.clone();
        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            durable.delete(&id)?;
            durable.flush()
        })
        .await??;
        Ok(())
    }

    /// Persist after cache changes, at most once per throttle window
    ///
    /// The task ends when the store is dropped.
    pub fn spawn_autosave(self: Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe(KeyFilter::All);
        let throttle = self.config.autosave_throttle;
        tokio::spawn(async move {
            while changes.recv().await.is_some() {
                if !throttle.is_zero() {
                    tokio::time::sleep(throttle).await;
                }
                // Everything that arrived during the window goes into this write
                changes.drain();
                if let Err(e) = self.persist().await {
                    warn!("Autosave failed: {}", e);
                }
            }
            debug!("Autosave stopped");
        })
    }
}

fn normalize_status(mut entry: CacheEntry) -> CacheEntry {
    if matches!(
        entry.status,
        CacheStatus::Fetching | CacheStatus::Error | CacheStatus::Idle
    ) {
        entry.status = CacheStatus::Stale;
    }
    entry
}
