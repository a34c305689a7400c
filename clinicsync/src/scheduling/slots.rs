// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Next-slot suggestion under business hours
//!
//! Suggestions are advisory. Existing bookings are not consulted, so a
//! suggested slot may already be taken.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::canonical::hhmm;
use crate::error::{SyncError, SyncResult};

/// Slot granularity in minutes
pub const SLOT_MINUTES: u32 = 30;

/// Opening hours applied to every business day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessHours {
    #[serde(with = "hhmm")]
    pub open: NaiveTime,
    #[serde(with = "hhmm")]
    pub close: NaiveTime,
    pub days: Vec<Weekday>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl BusinessHours {
    pub fn new(open: NaiveTime, close: NaiveTime, days: Vec<Weekday>) -> Self {
        Self { open, close, days }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.open >= self.close {
            return Err(format!(
                "opening time {} must be before closing time {}",
                self.open.format(hhmm::FORMAT),
                self.close.format(hhmm::FORMAT)
            ));
        }
        if self.days.is_empty() {
            return Err("at least one business day is required".to_string());
        }
        Ok(())
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday())
    }

    /// Whether a slot starting at `at` lies within opening hours
    pub fn is_open_at(&self, at: NaiveDateTime) -> bool {
        self.is_business_day(at.date()) && at.time() >= self.open && at.time() < self.close
    }

    fn next_business_day_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        (1..=7)
            .filter_map(|offset| date.checked_add_signed(Duration::days(offset)))
            .find(|candidate| self.is_business_day(*candidate))
    }
}

/// Suggested appointment start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCandidate {
    pub date_time: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veterinarian_id: Option<String>,
}

impl SlotCandidate {
    pub fn with_veterinarian(mut self, id: impl Into<String>) -> Self {
        self.veterinarian_id = Some(id.into());
        self
    }
}

/// Round up to the next half-hour boundary; boundaries map to themselves
pub fn round_up_to_slot(at: NaiveDateTime) -> NaiveDateTime {
    let time = at.time();
    let on_boundary = time.minute() % SLOT_MINUTES == 0 && time.second() == 0 && time.nanosecond() == 0;
    if on_boundary {
        return at;
    }
    let floored = at.date().and_time(
        NaiveTime::from_hms_opt(time.hour(), time.minute() - time.minute() % SLOT_MINUTES, 0)
            .unwrap_or(time),
    );
    floored + Duration::minutes(SLOT_MINUTES as i64)
}

/// Earliest slot at or after `now`, all in local time
pub fn find_next_slot(now: NaiveDateTime, hours: &BusinessHours) -> SyncResult<SlotCandidate> {
    hours.validate().map_err(SyncError::Configuration)?;

    let candidate = round_up_to_slot(now);
    let date = candidate.date();
    let date_time = if hours.is_business_day(date) && candidate.time() < hours.open {
        date.and_time(hours.open)
    } else if hours.is_open_at(candidate) {
        candidate
    } else {
        let next = hours.next_business_day_after(date).ok_or_else(|| {
            SyncError::Configuration(format!("no business day follows {}", date))
        })?;
        next.and_time(hours.open)
    };

    Ok(SlotCandidate {
        date_time,
        veterinarian_id: None,
    })
}
