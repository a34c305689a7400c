// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Canonical appointment record and per-shape canonicalization

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::raw::{
    CalendarEvent, CreationRequest, LegacyRow, RawAppointment, Rejection, RejectionReason,
    SourceShape,
};

/// `HH:MM` serialization for times of day
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_time_of_day(&text).ok_or_else(|| de::Error::custom(format!("invalid time '{}'", text)))
    }
}

/// One appointment, independent of which producer emitted it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalAppointment {
    pub id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub animal_name: String,
    pub owner_name: String,
    pub subject: String,
}

impl CanonicalAppointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Order within a day: time, then id
    pub fn cmp_within_day(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time).then_with(|| self.id.cmp(&other.id))
    }

    fn draft_id(date: NaiveDate, time: NaiveTime, animal: &str, owner: &str, subject: &str) -> String {
        let mut hasher = crc32fast::Hasher::new();
        for part in [
            date.to_string().as_str(),
            time.format(hhmm::FORMAT).to_string().as_str(),
            animal,
            owner,
            subject,
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        format!("draft-{:08x}", hasher.finalize())
    }

    fn build(
        id: Option<&str>,
        local: NaiveDateTime,
        animal_name: &str,
        owner_name: &str,
        subject: &str,
    ) -> Self {
        let date = local.date();
        let time = truncate_to_minute(local.time());
        let id = match id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Self::draft_id(date, time, animal_name, owner_name, subject),
        };
        Self {
            id,
            date,
            time,
            animal_name: animal_name.trim().to_string(),
            owner_name: owner_name.trim().to_string(),
            subject: subject.trim().to_string(),
        }
    }
}

impl RawAppointment {
    /// Canonicalize into `tz` local time
    pub fn canonicalize(&self, tz: &Tz) -> Result<CanonicalAppointment, Rejection> {
        match self {
            RawAppointment::CreationRequest(request) => from_creation_request(request),
            RawAppointment::CalendarEvent(event) => from_calendar_event(event, tz),
            RawAppointment::LegacyRow(row) => from_legacy_row(row),
        }
    }
}

fn from_creation_request(request: &CreationRequest) -> Result<CanonicalAppointment, Rejection> {
    let reject = |reason| Rejection::new(SourceShape::CreationRequest, request.id.as_deref(), reason);
    let slot = request
        .appointment
        .as_ref()
        .ok_or_else(|| reject(RejectionReason::MissingTimestamp))?;
    let (date, time) = match (non_blank(&slot.date), non_blank(&slot.time)) {
        (Some(date), Some(time)) => (date, time),
        _ => return Err(reject(RejectionReason::MissingTimestamp)),
    };
    let invalid = || reject(RejectionReason::InvalidTimestamp(format!("{} {}", date, time)));
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
    let time = parse_time_of_day(time).ok_or_else(invalid)?;

    Ok(CanonicalAppointment::build(
        request.id.as_deref(),
        date.and_time(time),
        &request.patient_name,
        &request.owner_name,
        &request.reason,
    ))
}

fn from_calendar_event(event: &CalendarEvent, tz: &Tz) -> Result<CanonicalAppointment, Rejection> {
    let reject = |reason| Rejection::new(SourceShape::CalendarEvent, event.id.as_deref(), reason);
    let start = non_blank(&event.start).ok_or_else(|| reject(RejectionReason::MissingTimestamp))?;
    let local = parse_instant(start, tz)
        .ok_or_else(|| reject(RejectionReason::InvalidTimestamp(start.to_string())))?;

    let props = &event.extended_props;
    Ok(CanonicalAppointment::build(
        event.id.as_deref(),
        local,
        props.animal_name.as_deref().unwrap_or_default(),
        props.owner_name.as_deref().unwrap_or_default(),
        &event.title,
    ))
}

fn from_legacy_row(row: &LegacyRow) -> Result<CanonicalAppointment, Rejection> {
    let reject = |reason| Rejection::new(SourceShape::LegacyRow, row.id.as_deref(), reason);
    let stamp = non_blank(&row.date_time).ok_or_else(|| reject(RejectionReason::MissingTimestamp))?;
    let local = ["%d/%m/%Y %H:%M", "%d/%m/%Y %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(stamp, format).ok())
        .ok_or_else(|| reject(RejectionReason::InvalidTimestamp(stamp.to_string())))?;

    Ok(CanonicalAppointment::build(
        row.id.as_deref(),
        local,
        &row.animal,
        &row.owner,
        &row.subject,
    ))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// `HH:MM` or `HH:MM:SS`
pub(crate) fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .ok()
}

/// Offset timestamps convert into `tz`; naive ones are already local
fn parse_instant(text: &str, tz: &Tz) -> Option<NaiveDateTime> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(tz).naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}
