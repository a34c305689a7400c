// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Scheduling resolver
//!
//! Sits downstream of the query executor: it reads appointment feeds out of
//! cache entries, never writes to the cache.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use super::buckets::DayIndex;
use super::canonical::CanonicalAppointment;
use super::raw::{RawAppointment, Rejection};
use super::slots::{self, BusinessHours, SlotCandidate};
use crate::cache::{CacheEntry, Payload};
use crate::error::{SyncError, SyncResult};

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulingConfig {
    /// IANA zone name, e.g. `Europe/Madrid`
    pub time_zone: String,
    pub business_hours: BusinessHours,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            time_zone: "UTC".to_string(),
            business_hours: BusinessHours::default(),
        }
    }
}

impl SchedulingConfig {
    pub fn in_zone(time_zone: &str) -> Self {
        Self {
            time_zone: time_zone.to_string(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate().map_err(SyncError::Configuration)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|e| format!("invalid time zone '{}': {}", self.time_zone, e))?;
        self.business_hours.validate()
    }
}

/// Result of indexing one feed
#[derive(Debug, Clone, Default)]
pub struct FeedIndex {
    pub days: DayIndex,
    pub rejected: Vec<Rejection>,
}

/// Canonicalizes appointment feeds and suggests slots
pub struct SchedulingResolver {
    tz: Tz,
    hours: BusinessHours,
    rejections: AtomicU64,
}

impl SchedulingResolver {
    pub fn new(config: SchedulingConfig) -> SyncResult<Self> {
        config.validate().map_err(SyncError::Configuration)?;
        let tz = config
            .time_zone
            .parse::<Tz>()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        Ok(Self {
            tz,
            hours: config.business_hours,
            rejections: AtomicU64::new(0),
        })
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    pub fn business_hours(&self) -> &BusinessHours {
        &self.hours
    }

    /// Canonicalize one typed record
    pub fn canonicalize(&self, raw: &RawAppointment) -> Result<CanonicalAppointment, Rejection> {
        raw.canonicalize(&self.tz).map_err(|rejection| self.reject(rejection))
    }

    /// Detect the shape of an untyped record and canonicalize it
    pub fn canonicalize_value(&self, value: &Value) -> Result<CanonicalAppointment, Rejection> {
        RawAppointment::detect(value)
            .and_then(|raw| raw.canonicalize(&self.tz))
            .map_err(|rejection| self.reject(rejection))
    }

    /// Canonicalize a batch; rejected records are returned separately
    pub fn canonicalize_all<'a, I>(&self, values: I) -> (Vec<CanonicalAppointment>, Vec<Rejection>)
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for value in values {
            match self.canonicalize_value(value) {
                Ok(record) => accepted.push(record),
                Err(rejection) => rejected.push(rejection),
            }
        }
        (accepted, rejected)
    }

    pub fn bucket_by_day<I>(&self, records: I) -> DayIndex
    where
        I: IntoIterator<Item = CanonicalAppointment>,
    {
        DayIndex::build(records)
    }

    /// Index a feed payload: a JSON array of raw records, or an object
    /// wrapping one under `appointments`
    pub fn index_feed(&self, payload: &Payload) -> SyncResult<FeedIndex> {
        let records = match payload {
            Value::Array(records) => records,
            Value::Object(object) => match object.get("appointments") {
                Some(Value::Array(records)) => records,
                _ => return Err(SyncError::Serialization("appointment feed is not a list".to_string())),
            },
            _ => return Err(SyncError::Serialization("appointment feed is not a list".to_string())),
        };

        let (accepted, rejected) = self.canonicalize_all(records);
        debug!(
            "Indexed appointment feed: {} accepted, {} rejected",
            accepted.len(),
            rejected.len()
        );
        Ok(FeedIndex {
            days: DayIndex::build(accepted),
            rejected,
        })
    }

    /// Index the feed held by a cache entry; an entry without data is empty
    pub fn index_entry(&self, entry: &CacheEntry) -> SyncResult<FeedIndex> {
        match &entry.data {
            Some(payload) => self.index_feed(payload),
            None => Ok(FeedIndex::default()),
        }
    }

    /// Index restricted to `from..=to`
    pub fn index_range(&self, payload: &Payload, from: NaiveDate, to: NaiveDate) -> SyncResult<FeedIndex> {
        let mut index = self.index_feed(payload)?;
        index.days = index.days.restricted_to(from, to);
        Ok(index)
    }

    /// Earliest slot at or after `now`, in the configured zone
    pub fn find_next_slot(&self, now: DateTime<Utc>) -> SyncResult<SlotCandidate> {
        let local = now.with_timezone(&self.tz).naive_local();
        slots::find_next_slot(local, &self.hours)
    }

    /// Records rejected since construction
    pub fn rejection_count(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    fn reject(&self, rejection: Rejection) -> Rejection {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        warn!("Appointment rejected: {}", rejection);
        rejection
    }
}

impl Default for SchedulingResolver {
    fn default() -> Self {
        Self {
            tz: Tz::UTC,
            hours: BusinessHours::default(),
            rejections: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{keys, CacheStatus};
    use chrono::{NaiveTime, TimeZone};
    use serde_json::json;

    fn feed() -> Payload {
        json!([
            {"id": 1, "animal": "Luna", "owner": "Cy", "subject": "Dental", "dateTime": "15/01/2024 14:00"},
            {"id": 2, "title": "Checkup", "start": "2024-01-15T09:00:00Z",
             "extendedProps": {"animalName": "Milo", "ownerName": "Ben"}},
            {"id": 3, "patientName": "Rex", "ownerName": "Ana", "reason": "Vaccination",
             "appointment": {"date": "2024-01-15", "time": "10:30"}},
            {"id": 4, "patientName": "Kit", "ownerName": "Dee",
             "appointment": {"date": "2024-01-16", "time": "11:00"}},
            {"id": 5, "title": "Broken", "start": "not a date"},
            {"id": 6, "animal": "Ghost", "owner": "Nobody"}
        ])
    }

    #[test]
    fn test_index_feed_buckets_and_rejects() {
        let resolver = SchedulingResolver::default();
        let index = resolver.index_feed(&feed()).unwrap();

        let jan15 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let ids: Vec<&str> = index.days.day(jan15).iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
        assert_eq!(index.days.len(), 4);

        let rejected: Vec<Option<&str>> = index.rejected.iter().map(|r| r.record_id.as_deref()).collect();
        assert_eq!(rejected, vec![Some("5"), Some("6")]);
        assert_eq!(resolver.rejection_count(), 2);

        resolver.index_feed(&json!({"appointments": [{"id": 9}]})).unwrap();
        assert_eq!(resolver.rejection_count(), 3);
    }

    #[test]
    fn test_rejected_records_never_bucketed() {
        let resolver = SchedulingResolver::default();
        let index = resolver
            .index_feed(&json!([{"id": "x", "patientName": "Rex", "ownerName": "Ana"}]))
            .unwrap();
        assert!(index.days.is_empty());
        assert_eq!(index.rejected.len(), 1);
        assert!(resolver.index_feed(&json!("nope")).is_err());
    }

    #[test]
    fn test_index_cache_entry() {
        let store = crate::cache::CacheStore::default();
        let key = keys::appointments::lists();
        store.set(key.clone(), feed(), CacheStatus::Fresh);

        let resolver = SchedulingResolver::default();
        let index = resolver.index_entry(&store.peek(&key).unwrap()).unwrap();
        assert_eq!(index.days.day_count(), 2);

        let empty = CacheEntry::new(key, std::time::Duration::from_secs(1));
        assert!(resolver.index_entry(&empty).unwrap().days.is_empty());
    }

    #[test]
    fn test_range_restriction() {
        let resolver = SchedulingResolver::default();
        let day = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let index = resolver.index_range(&feed(), day, day).unwrap();
        assert_eq!(index.days.len(), 1);
    }

    #[test]
    fn test_next_slot_uses_zone() {
        let resolver = SchedulingResolver::new(SchedulingConfig::in_zone("Europe/Madrid")).unwrap();
        // 16:45 UTC is 17:45 in Madrid in winter
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 16, 45, 0).unwrap();
        let slot = resolver.find_next_slot(now).unwrap();
        assert_eq!(slot.date_time.date(), NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
        assert_eq!(slot.date_time.time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());

        let utc = SchedulingResolver::default();
        assert_eq!(
            utc.find_next_slot(now).unwrap().date_time.time(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_config_from_json() {
        let config = SchedulingConfig::from_json_str(
            r#"{"timeZone": "America/New_York", "businessHours": {"open": "08:00", "close": "16:00"}}"#,
        )
        .unwrap();
        let resolver = SchedulingResolver::new(config).unwrap();
        assert_eq!(resolver.time_zone(), Tz::America__New_York);
        assert_eq!(resolver.business_hours().days.len(), 5);

        assert!(SchedulingConfig::from_json_str(r#"{"timeZone": "Mars/Olympus"}"#).is_err());
        assert!(SchedulingResolver::new(SchedulingConfig::in_zone("Nowhere")).is_err());
    }
}
