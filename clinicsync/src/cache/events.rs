// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Change notifications for cache subscribers

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::entry::CacheStatus;
use super::query_key::QueryKey;

/// What happened to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEventKind {
    /// Data or status written
    Updated,
    /// Flipped to stale, data retained
    Invalidated,
    /// Entry deleted
    Removed,
}

/// Notification emitted for every write to the store
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub kind: CacheEventKind,
    /// Status after the change; `None` when removed
    pub status: Option<CacheStatus>,
}

/// Which keys a subscriber wants to hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    Exact(QueryKey),
    Prefix(QueryKey),
    All,
}

impl KeyFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyFilter::Exact(k) => k == key,
            KeyFilter::Prefix(prefix) => key.starts_with(prefix),
            KeyFilter::All => true,
        }
    }
}

/// Filtered receiver of cache events
pub struct Subscription {
    filter: KeyFilter,
    receiver: broadcast::Receiver<CacheEvent>,
}

impl Subscription {
    pub(crate) fn new(filter: KeyFilter, receiver: broadcast::Receiver<CacheEvent>) -> Self {
        Self { filter, receiver }
    }

    pub fn filter(&self) -> &KeyFilter {
        &self.filter
    }

    /// Wait for the next matching event; `None` once the store is gone
    pub async fn recv(&mut self) -> Option<CacheEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event.key) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Cache subscriber {:?} lagged, {} events skipped",
                        self.filter, skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting
    pub fn try_recv(&mut self) -> Option<CacheEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event.key) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(
                        "Cache subscriber {:?} lagged, {} events skipped",
                        self.filter, skipped
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every queued matching event
    pub fn drain(&mut self) -> Vec<CacheEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
