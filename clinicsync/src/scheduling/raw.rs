// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Appointment payload shapes as they arrive from the backend and the UI

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Which producer a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceShape {
    CreationRequest,
    CalendarEvent,
    LegacyRow,
    Unknown,
}

impl fmt::Display for SourceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceShape::CreationRequest => "creation request",
            SourceShape::CalendarEvent => "calendar event",
            SourceShape::LegacyRow => "legacy row",
            SourceShape::Unknown => "unrecognized",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    MissingTimestamp,
    InvalidTimestamp(String),
    Malformed(String),
    UnrecognizedShape,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingTimestamp => write!(f, "missing timestamp"),
            RejectionReason::InvalidTimestamp(value) => write!(f, "unparsable timestamp '{}'", value),
            RejectionReason::Malformed(detail) => write!(f, "malformed record: {}", detail),
            RejectionReason::UnrecognizedShape => write!(f, "unrecognized record shape"),
        }
    }
}

/// A record that could not be canonicalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{shape} {} rejected: {reason}", record_id.as_deref().unwrap_or("<no id>"))]
pub struct Rejection {
    pub shape: SourceShape,
    pub record_id: Option<String>,
    pub reason: RejectionReason,
}

impl Rejection {
    pub fn new(shape: SourceShape, record_id: Option<&str>, reason: RejectionReason) -> Self {
        Self {
            shape,
            record_id: record_id.map(str::to_string),
            reason,
        }
    }
}

/// Ids arrive as strings or numbers
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Str(String),
        Int(i64),
    }

    Ok(Option::<IdRepr>::deserialize(deserializer)?.map(|id| match id {
        IdRepr::Str(s) => s,
        IdRepr::Int(i) => i.to_string(),
    }))
}

/// Nested `{date, time}` block of a booking form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedSlot {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

/// Booking form submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationRequest {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    pub patient_name: String,
    pub owner_name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub appointment: Option<RequestedSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventProps {
    #[serde(default)]
    pub animal_name: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
}

/// Calendar widget event; `start` is RFC 3339
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub extended_props: CalendarEventProps,
}

/// Row of the legacy appointment list; `dateTime` is day-first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRow {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    pub animal: String,
    pub owner: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub date_time: Option<String>,
}

/// Any incoming appointment representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RawAppointment {
    CreationRequest(CreationRequest),
    CalendarEvent(CalendarEvent),
    LegacyRow(LegacyRow),
}

impl RawAppointment {
    pub fn shape(&self) -> SourceShape {
        match self {
            RawAppointment::CreationRequest(_) => SourceShape::CreationRequest,
            RawAppointment::CalendarEvent(_) => SourceShape::CalendarEvent,
            RawAppointment::LegacyRow(_) => SourceShape::LegacyRow,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            RawAppointment::CreationRequest(r) => r.id.as_deref(),
            RawAppointment::CalendarEvent(e) => e.id.as_deref(),
            RawAppointment::LegacyRow(r) => r.id.as_deref(),
        }
    }

    /// Recognize the shape of an untyped record
    ///
    /// Records carrying an explicit `source` tag are decoded by tag; others
    /// are recognized by their distinguishing fields.
    pub fn detect(value: &Value) -> Result<RawAppointment, Rejection> {
        let record_id = value.get("id").and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let object = value.as_object().ok_or_else(|| {
            Rejection::new(SourceShape::Unknown, None, RejectionReason::UnrecognizedShape)
        })?;

        let shape = if let Some(tag) = object.get("source").and_then(Value::as_str) {
            match tag {
                "creation_request" => SourceShape::CreationRequest,
                "calendar_event" => SourceShape::CalendarEvent,
                "legacy_row" => SourceShape::LegacyRow,
                _ => SourceShape::Unknown,
            }
        } else if object.contains_key("patientName") || object.contains_key("appointment") {
            SourceShape::CreationRequest
        } else if object.contains_key("start") || object.contains_key("extendedProps") {
            SourceShape::CalendarEvent
        } else if object.contains_key("dateTime") || object.contains_key("animal") {
            SourceShape::LegacyRow
        } else {
            SourceShape::Unknown
        };

        let malformed = |e: serde_json::Error| {
            Rejection::new(shape, record_id.as_deref(), RejectionReason::Malformed(e.to_string()))
        };
        let value = value.clone();
        match shape {
            SourceShape::CreationRequest => serde_json::from_value(value)
                .map(RawAppointment::CreationRequest)
                .map_err(malformed),
            SourceShape::CalendarEvent => serde_json::from_value(value)
                .map(RawAppointment::CalendarEvent)
                .map_err(malformed),
            SourceShape::LegacyRow => serde_json::from_value(value)
                .map(RawAppointment::LegacyRow)
                .map_err(malformed),
            SourceShape::Unknown => Err(Rejection::new(
                shape,
                record_id.as_deref(),
                RejectionReason::UnrecognizedShape,
            )),
        }
    }
}
