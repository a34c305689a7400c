// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache entries and their status state machine

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::query_key::QueryKey;
use crate::error::{SyncError, SyncResult};

/// Opaque server-derived payload
pub type Payload = serde_json::Value;

/// Entry lifecycle states
///
/// ```text
/// idle ──► fetching ──► fresh ──► stale ──► fetching
///             │  ▲                  ▲
///             ▼  │                  │
///           error ──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheStatus {
    /// Created but never fetched
    Idle,
    /// A fetch is in flight
    Fetching,
    /// Data is current
    Fresh,
    /// Data is servable but must be refetched on next read
    Stale,
    /// Last fetch failed; prior data, if any, is preserved
    Error,
}

impl CacheStatus {
    /// Whether the fetch lifecycle may move from `self` to `next`
    pub fn can_transition_to(self, next: CacheStatus) -> bool {
        use CacheStatus::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                // A new leader takes over an entry whose fetch was detached
                | (Fetching, Fetching)
                | (Fetching, Fresh)
                | (Fetching, Error)
                | (Fetching, Stale)
                | (Fetching, Idle)
                | (Fresh, Stale)
                | (Fresh, Fetching)
                | (Stale, Fetching)
                | (Stale, Fresh)
                | (Error, Fetching)
                | (Error, Stale)
                | (Error, Fresh)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Idle => "idle",
            CacheStatus::Fetching => "fetching",
            CacheStatus::Fresh => "fresh",
            CacheStatus::Stale => "stale",
            CacheStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored value plus freshness metadata for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: QueryKey,
    pub data: Option<Payload>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale_after: Duration,
    pub status: CacheStatus,
    /// Message of the last failed fetch
    pub error: Option<String>,
    /// Last write of any kind, drives garbage collection
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Empty entry in the `idle` state
    pub fn new(key: QueryKey, stale_after: Duration) -> Self {
        Self {
            key,
            data: None,
            fetched_at: None,
            stale_after,
            status: CacheStatus::Idle,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Time since the data was fetched
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.fetched_at.map(|t| elapsed_between(t, now))
    }

    /// `fresh` status and still within `stale_after`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CacheStatus::Fresh
            && self
                .age_at(now)
                .map(|age| age < self.stale_after)
                .unwrap_or(false)
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// Decode the payload into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> SyncResult<Option<T>> {
        match &self.data {
            Some(data) => serde_json::from_value(data.clone())
                .map(Some)
                .map_err(|e| {
                    SyncError::Serialization(format!("Entry {} does not decode: {}", self.key, e))
                }),
            None => Ok(None),
        }
    }
}

/// Non-negative wall-clock distance from `earlier` to `later`
pub(crate) fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    later
        .signed_duration_since(earlier)
        .to_std()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;

    #[test]
    fn test_fetch_lifecycle_transitions() {
        use CacheStatus::*;

        assert!(Idle.can_transition_to(Fetching));
        assert!(Fetching.can_transition_to(Fresh));
        assert!(Fresh.can_transition_to(Stale));
        assert!(Stale.can_transition_to(Fetching));
        assert!(Fetching.can_transition_to(Error));
        assert!(Error.can_transition_to(Fetching));

        assert!(!Idle.can_transition_to(Fresh));
        assert!(!Idle.can_transition_to(Stale));
        assert!(!Fresh.can_transition_to(Error));
        assert!(!Stale.can_transition_to(Error));
    }

    #[test]
    fn test_freshness_is_time_bounded() {
        let now = Utc::now();
        let mut entry = CacheEntry::new(query_key!("staff", "list"), Duration::from_secs(30));
        assert!(!entry.is_fresh_at(now));

        entry.status = CacheStatus::Fresh;
        entry.fetched_at = Some(now - chrono::Duration::seconds(10));
        assert!(entry.is_fresh_at(now));
        assert!(!entry.is_fresh_at(now + chrono::Duration::seconds(25)));
    }

    #[test]
    fn test_decode_payload() {
        #[derive(Deserialize)]
        struct Item {
            sku: String,
        }

        let mut entry = CacheEntry::new(query_key!("stock-item", "detail", 1), Duration::ZERO);
        assert!(entry.decode::<Item>().unwrap().is_none());

        entry.data = Some(serde_json::json!({"sku": "AMOX-250"}));
        assert_eq!(entry.decode::<Item>().unwrap().unwrap().sku, "AMOX-250");

        entry.data = Some(serde_json::json!([1, 2]));
        assert!(entry.decode::<Item>().is_err());
    }
}
