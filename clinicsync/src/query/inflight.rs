// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-flight fetch registry
//!
//! One leader per key performs the fetch and publishes its outcome on a watch
//! channel; every other reader of the key waits on that channel. If the
//! leader is dropped before publishing, its guard unwinds the cache entry and
//! the closed channel tells followers to elect a new leader.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::{CacheStore, Payload, QueryKey};
use crate::error::SyncResult;

pub(crate) type FetchOutcome = Option<SyncResult<Payload>>;

pub(crate) struct InflightFetch {
    pub id: u64,
    pub revision: u64,
    pub receiver: watch::Receiver<FetchOutcome>,
}

impl InflightFetch {
    /// Still worth joining: not detached from the entry and leader alive
    pub fn is_joinable(&self, store: &CacheStore, key: &QueryKey) -> bool {
        store.revision(key) == Some(self.revision) && self.receiver.has_changed().is_ok()
    }
}

pub(crate) type InflightMap = Arc<Mutex<HashMap<QueryKey, InflightFetch>>>;

/// Held by the leader for the duration of its fetch
pub(crate) struct LeaderGuard {
    inflight: InflightMap,
    store: Arc<CacheStore>,
    key: QueryKey,
    id: u64,
    revision: u64,
    sender: Option<watch::Sender<FetchOutcome>>,
}

impl LeaderGuard {
    pub fn new(
        inflight: InflightMap,
        store: Arc<CacheStore>,
        key: QueryKey,
        id: u64,
        revision: u64,
        sender: watch::Sender<FetchOutcome>,
    ) -> Self {
        Self {
            inflight,
            store,
            key,
            id,
            revision,
            sender: Some(sender),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn deregister(&self) {
        let mut inflight = self.inflight.lock();
        if inflight.get(&self.key).map(|f| f.id) == Some(self.id) {
            inflight.remove(&self.key);
        }
    }

    /// Publish the outcome to every follower
    pub fn finish(mut self, outcome: SyncResult<Payload>) {
        self.deregister();
        if let Some(sender) = self.sender.take() {
            // Followers may all have gone away
            let _ = sender.send(Some(outcome));
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if self.sender.is_none() {
            return;
        }
        debug!("Fetch leader for {} dropped, unwinding", self.key);
        self.deregister();
        self.store.abandon_fetch(&self.key, self.revision);
        // Dropping the sender wakes followers
        self.sender.take();
    }
}
