// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Key-addressed store of fetched results
//!
//! All operations are synchronous and hold the lock only for the duration of
//! the call. Every write bumps the entry's revision, and fetch completion is a
//! compare-and-set on the revision captured when the fetch began.

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::cache_config::CacheConfig;
use super::entry::{elapsed_between, CacheEntry, CacheStatus, Payload};
use super::events::{CacheEvent, CacheEventKind, KeyFilter, Subscription};
use super::query_key::QueryKey;
use super::snapshot::CacheSnapshot;
use crate::error::{SyncError, SyncResult};

struct Slot {
    entry: CacheEntry,
    revision: u64,
    /// Status before the current fetch began
    pre_fetch: Option<CacheStatus>,
    /// Invalidated while fetching; the fetch settles as stale
    settle_stale: bool,
}

impl Slot {
    fn new(entry: CacheEntry, revision: u64) -> Self {
        Self {
            entry,
            revision,
            pre_fetch: None,
            settle_stale: false,
        }
    }

    /// Return an abandoned fetch to the status it started from
    fn unwind_fetch(&mut self, revision: u64, now: DateTime<Utc>) {
        let fallback = if self.entry.has_data() {
            CacheStatus::Stale
        } else {
            CacheStatus::Idle
        };
        let invalidated = std::mem::take(&mut self.settle_stale);
        self.entry.status = match self.pre_fetch.take() {
            _ if invalidated => fallback,
            Some(CacheStatus::Fetching) | None => fallback,
            Some(status) => status,
        };
        self.entry.updated_at = now;
        self.revision = revision;
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStoreStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub evictions: u64,
    /// Fetch results dropped because the entry changed while in flight
    pub discarded_fetches: u64,
}

impl CacheStoreStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory query cache
pub struct CacheStore {
    config: CacheConfig,
    slots: RwLock<HashMap<QueryKey, Slot>>,
    /// Observer reference counts; retained keys survive garbage collection
    retained: Mutex<HashMap<QueryKey, usize>>,
    revisions: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
    stats: Mutex<CacheStoreStats>,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            slots: RwLock::new(HashMap::new()),
            retained: Mutex::new(HashMap::new()),
            revisions: AtomicU64::new(1),
            events,
            stats: Mutex::new(CacheStoreStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed)
    }

    fn notify(&self, key: QueryKey, kind: CacheEventKind, status: Option<CacheStatus>) {
        // No receivers is not an error
        let _ = self.events.send(CacheEvent { key, kind, status });
    }

    /// Read an entry, counting a hit when it holds data
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        let entry = self.peek(key);
        let mut stats = self.stats.lock();
        match &entry {
            Some(e) if e.has_data() => stats.hits += 1,
            _ => stats.misses += 1,
        }
        entry
    }

    /// Read an entry without touching statistics
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.slots.read().get(key).map(|slot| slot.entry.clone())
    }

    /// Current data of an entry
    pub fn data(&self, key: &QueryKey) -> Option<Payload> {
        self.slots
            .read()
            .get(key)
            .and_then(|slot| slot.entry.data.clone())
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.slots.read().contains_key(key)
    }

    /// Revision of the entry's last write
    pub fn revision(&self, key: &QueryKey) -> Option<u64> {
        self.slots.read().get(key).map(|slot| slot.revision)
    }

    /// Direct write of data and status
    ///
    /// A `fresh` write stamps `fetched_at` and clears any previous error.
    pub fn set(&self, key: QueryKey, data: Payload, status: CacheStatus) {
        let now = Utc::now();
        {
            let mut slots = self.slots.write();
            let revision = self.next_revision();
            let slot = slots.entry(key.clone()).or_insert_with(|| {
                Slot::new(
                    CacheEntry::new(key.clone(), self.config.default_stale_after),
                    revision,
                )
            });
            slot.revision = revision;
            slot.pre_fetch = None;
            slot.settle_stale = false;
            slot.entry.data = Some(data);
            slot.entry.status = status;
            slot.entry.updated_at = now;
            if status == CacheStatus::Fresh {
                slot.entry.fetched_at = Some(now);
                slot.entry.error = None;
            }
        }
        self.stats.lock().writes += 1;
        debug!("Cache set {} ({})", key, status);
        self.notify(key, CacheEventKind::Updated, Some(status));
    }

    /// Replace an entry wholesale
    pub fn set_entry(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        let status = entry.status;
        {
            let mut slots = self.slots.write();
            let revision = self.next_revision();
            slots.insert(key.clone(), Slot::new(entry, revision));
        }
        self.stats.lock().writes += 1;
        self.notify(key, CacheEventKind::Updated, Some(status));
    }

    /// Rewrite an entry's data from its current value
    ///
    /// The updater sees the current data (if any); returning `None` leaves the
    /// entry untouched. The result is written as `fresh`.
    pub fn update<F>(&self, key: &QueryKey, updater: F) -> bool
    where
        F: FnOnce(Option<&Payload>) -> Option<Payload>,
    {
        let current = self.data(key);
        match updater(current.as_ref()) {
            Some(next) => {
                self.set(key.clone(), next, CacheStatus::Fresh);
                true
            }
            None => false,
        }
    }

    /// Flip every entry under `prefix` to stale, keeping its data
    ///
    /// An entry that is fetching stays `fetching` so readers keep joining the
    /// running fetch; its result is written as `stale`. Returns the number of
    /// entries invalidated.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let now = Utc::now();
        let mut flipped = Vec::new();
        {
            let mut slots = self.slots.write();
            for (key, slot) in slots.iter_mut() {
                if !key.starts_with(prefix) {
                    continue;
                }
                match slot.entry.status {
                    CacheStatus::Fresh | CacheStatus::Error => {
                        slot.entry.status = CacheStatus::Stale;
                        slot.entry.updated_at = now;
                        slot.revision = self.next_revision();
                        flipped.push((key.clone(), CacheStatus::Stale));
                    }
                    CacheStatus::Fetching if !slot.settle_stale => {
                        slot.settle_stale = true;
                        flipped.push((key.clone(), CacheStatus::Fetching));
                    }
                    CacheStatus::Fetching | CacheStatus::Idle | CacheStatus::Stale => {}
                }
            }
        }

        if !flipped.is_empty() {
            self.stats.lock().invalidations += flipped.len() as u64;
            debug!("Invalidated {} entries under {}", flipped.len(), prefix);
        }
        let count = flipped.len();
        for (key, status) in flipped {
            self.notify(key, CacheEventKind::Invalidated, Some(status));
        }
        count
    }

    pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
        let removed = self.slots.write().remove(key).map(|slot| slot.entry);
        if removed.is_some() {
            self.notify(key.clone(), CacheEventKind::Removed, None);
        }
        removed
    }

    /// Full reset; every removal is notified
    pub fn clear(&self) -> usize {
        let drained: Vec<QueryKey> = {
            let mut slots = self.slots.write();
            let mut keys: Vec<QueryKey> = slots.drain().map(|(key, _)| key).collect();
            keys.sort();
            keys
        };
        info!("Cache cleared ({} entries)", drained.len());
        let count = drained.len();
        for key in drained {
            self.notify(key, CacheEventKind::Removed, None);
        }
        count
    }

    /// Capture the current state of `keys`, absent keys included
    pub fn snapshot(&self, keys: &[QueryKey]) -> CacheSnapshot {
        let slots = self.slots.read();
        let mut snapshot = CacheSnapshot::new();
        for key in keys {
            snapshot.record(key.clone(), slots.get(key).map(|slot| slot.entry.clone()));
        }
        snapshot
    }

    /// Write a snapshot back verbatim; keys captured as absent are removed
    pub fn restore(&self, snapshot: &CacheSnapshot) {
        let mut changes = Vec::with_capacity(snapshot.len());
        {
            let mut slots = self.slots.write();
            for (key, entry) in snapshot.iter() {
                match entry {
                    Some(entry) => {
                        let revision = self.next_revision();
                        slots.insert(key.clone(), Slot::new(entry.clone(), revision));
                        changes.push((key.clone(), CacheEventKind::Updated, Some(entry.status)));
                    }
                    None => {
                        if slots.remove(key).is_some() {
                            changes.push((key.clone(), CacheEventKind::Removed, None));
                        }
                    }
                }
            }
        }
        for (key, kind, status) in changes {
            self.notify(key, kind, status);
        }
    }

    /// Move an entry to `fetching`, creating it if needed
    ///
    /// Returns the revision the fetch result must be written against.
    pub fn begin_fetch(&self, key: &QueryKey, stale_after: Duration) -> SyncResult<u64> {
        let revision = {
            let mut slots = self.slots.write();
            let revision = self.next_revision();
            let slot = slots.entry(key.clone()).or_insert_with(|| {
                Slot::new(CacheEntry::new(key.clone(), stale_after), revision)
            });
            check_transition(key, slot.entry.status, CacheStatus::Fetching)?;
            slot.pre_fetch = Some(slot.entry.status);
            slot.settle_stale = false;
            slot.revision = revision;
            slot.entry.status = CacheStatus::Fetching;
            slot.entry.stale_after = stale_after;
            slot.entry.updated_at = Utc::now();
            revision
        };
        debug!("Fetch started for {} (rev {})", key, revision);
        self.notify(key.clone(), CacheEventKind::Updated, Some(CacheStatus::Fetching));
        Ok(revision)
    }

    /// Write a fetch result if the entry has not changed since the fetch began
    pub fn complete_fetch(&self, key: &QueryKey, revision: u64, data: Payload) -> bool {
        self.settle_fetch(key, revision, CacheStatus::Fresh, |entry, now| {
            entry.data = Some(data);
            entry.fetched_at = Some(now);
            entry.error = None;
        })
    }

    /// Record a failed fetch, keeping last-known-good data
    pub fn fail_fetch(&self, key: &QueryKey, revision: u64, message: &str) -> bool {
        self.settle_fetch(key, revision, CacheStatus::Error, |entry, _| {
            entry.error = Some(message.to_string());
        })
    }

    fn settle_fetch<F>(&self, key: &QueryKey, revision: u64, next: CacheStatus, apply: F) -> bool
    where
        F: FnOnce(&mut CacheEntry, DateTime<Utc>),
    {
        let now = Utc::now();
        let settled = {
            let mut slots = self.slots.write();
            match slots.get_mut(key) {
                Some(slot)
                    if slot.revision == revision
                        && slot.entry.status.can_transition_to(next) =>
                {
                    // Data fetched before an invalidation is already stale
                    let invalidated = std::mem::take(&mut slot.settle_stale);
                    let status = match next {
                        CacheStatus::Fresh if invalidated => CacheStatus::Stale,
                        other => other,
                    };
                    apply(&mut slot.entry, now);
                    slot.entry.status = status;
                    slot.entry.updated_at = now;
                    slot.pre_fetch = None;
                    slot.revision = self.next_revision();
                    Some((status, invalidated))
                }
                _ => None,
            }
        };

        match settled {
            Some((status, invalidated)) => {
                self.stats.lock().writes += 1;
                debug!("Fetch settled for {} ({})", key, status);
                // Invalidated readers refetch once the running fetch is done
                let kind = if invalidated {
                    CacheEventKind::Invalidated
                } else {
                    CacheEventKind::Updated
                };
                self.notify(key.clone(), kind, Some(status));
                true
            }
            None => {
                self.stats.lock().discarded_fetches += 1;
                debug!("Discarding superseded fetch result for {}", key);
                false
            }
        }
    }

    /// Detach whatever fetch is in flight for `key`
    pub fn cancel_fetch(&self, key: &QueryKey) -> bool {
        self.unwind(key, None)
    }

    /// Undo a fetch whose leader went away, if it is still the current one
    pub fn abandon_fetch(&self, key: &QueryKey, revision: u64) -> bool {
        self.unwind(key, Some(revision))
    }

    fn unwind(&self, key: &QueryKey, expected: Option<u64>) -> bool {
        let status = {
            let mut slots = self.slots.write();
            match slots.get_mut(key) {
                Some(slot)
                    if slot.entry.status == CacheStatus::Fetching
                        && expected.map_or(true, |rev| rev == slot.revision) =>
                {
                    let revision = self.next_revision();
                    slot.unwind_fetch(revision, Utc::now());
                    Some(slot.entry.status)
                }
                _ => None,
            }
        };

        match status {
            Some(status) => {
                debug!("Fetch for {} unwound to {}", key, status);
                self.notify(key.clone(), CacheEventKind::Updated, Some(status));
                true
            }
            None => false,
        }
    }

    /// Register interest in `filter`'s keys
    pub fn subscribe(&self, filter: KeyFilter) -> Subscription {
        Subscription::new(filter, self.events.subscribe())
    }

    /// Protect a key from garbage collection while an observer holds it
    pub fn retain(&self, key: &QueryKey) {
        *self.retained.lock().entry(key.clone()).or_insert(0) += 1;
    }

    pub fn release(&self, key: &QueryKey) {
        let mut retained = self.retained.lock();
        if let Some(count) = retained.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                retained.remove(key);
            }
        }
    }

    pub fn is_retained(&self, key: &QueryKey) -> bool {
        self.retained.lock().contains_key(key)
    }

    /// Evict entries idle for longer than `gc_after`
    ///
    /// Entries that are fetching or retained by an observer are kept.
    pub fn collect_garbage_at(&self, now: DateTime<Utc>) -> usize {
        let gc_after = self.config.gc_after;
        let mut evicted = Vec::new();
        {
            let mut slots = self.slots.write();
            let retained = self.retained.lock();
            slots.retain(|key, slot| {
                let keep = slot.entry.status == CacheStatus::Fetching
                    || retained.contains_key(key)
                    || elapsed_between(slot.entry.updated_at, now) < gc_after;
                if !keep {
                    evicted.push(key.clone());
                }
                keep
            });
        }

        if !evicted.is_empty() {
            self.stats.lock().evictions += evicted.len() as u64;
            debug!("Garbage collected {} entries", evicted.len());
        }
        let count = evicted.len();
        for key in evicted {
            self.notify(key, CacheEventKind::Removed, None);
        }
        count
    }

    pub fn collect_garbage(&self) -> usize {
        self.collect_garbage_at(Utc::now())
    }

    /// Run the collector every `gc_interval` until the store is dropped
    pub fn spawn_gc(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let period = self.config.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.collect_garbage();
                    }
                    None => break,
                }
            }
        })
    }

    /// All entries, ordered by key
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .slots
            .read()
            .values()
            .map(|slot| slot.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.slots.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys under `prefix`, ordered
    pub fn keys_under(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .slots
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub fn stats(&self) -> CacheStoreStats {
        self.stats.lock().clone()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn check_transition(key: &QueryKey, from: CacheStatus, to: CacheStatus) -> SyncResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(SyncError::InvalidTransition {
            key: key.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
