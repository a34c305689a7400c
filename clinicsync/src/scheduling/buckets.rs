// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Appointments grouped by local calendar day

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::canonical::CanonicalAppointment;

/// Calendar-day buckets, each ordered by time then id
///
/// The index owns no cache state; rebuild it whenever the underlying
/// appointment set changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayIndex {
    days: BTreeMap<NaiveDate, Vec<CanonicalAppointment>>,
}

impl DayIndex {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CanonicalAppointment>,
    {
        let mut days: BTreeMap<NaiveDate, Vec<CanonicalAppointment>> = BTreeMap::new();
        for record in records {
            days.entry(record.date).or_default().push(record);
        }
        for bucket in days.values_mut() {
            bucket.sort_by(CanonicalAppointment::cmp_within_day);
        }
        Self { days }
    }

    /// Appointments on `date`, empty when the day has none
    pub fn day(&self, date: NaiveDate) -> &[CanonicalAppointment] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or_default()
    }

    /// Days within `from..=to`, in date order
    pub fn range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Iterator<Item = (&NaiveDate, &Vec<CanonicalAppointment>)> {
        let bounds = if from <= to { from..=to } else { to..=from };
        self.days.range(bounds)
    }

    /// Restrict to `from..=to`
    pub fn restricted_to(&self, from: NaiveDate, to: NaiveDate) -> DayIndex {
        DayIndex {
            days: self
                .range(from, to)
                .map(|(date, bucket)| (*date, bucket.clone()))
                .collect(),
        }
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.days.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &Vec<CanonicalAppointment>)> {
        self.days.iter()
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Total appointments across all days
    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<NaiveDate, Vec<CanonicalAppointment>> {
        self.days
    }
}
