// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Point-in-time copies of selected cache entries

use std::collections::BTreeMap;

use super::entry::CacheEntry;
use super::query_key::QueryKey;

/// Previous value of every captured key; `None` records that the key was absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    entries: BTreeMap<QueryKey, Option<CacheEntry>>,
}

impl CacheSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, key: QueryKey, entry: Option<CacheEntry>) {
        self.entries.insert(key, entry);
    }

    /// Captured state of a key; outer `None` if the key was not captured
    pub fn get(&self, key: &QueryKey) -> Option<Option<&CacheEntry>> {
        self.entries.get(key).map(Option::as_ref)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QueryKey, Option<&CacheEntry>)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
