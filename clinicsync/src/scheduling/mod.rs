// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Appointment scheduling
//!
//! Appointment records reach the client in three shapes: booking form
//! submissions, calendar events and legacy list rows. This module folds them
//! into [`CanonicalAppointment`], groups them by local calendar day and
//! suggests the next bookable slot.

pub mod buckets;
pub mod canonical;
pub mod raw;
pub mod resolver;
pub mod slots;

pub use buckets::DayIndex;
pub use canonical::CanonicalAppointment;
pub use raw::{
    CalendarEvent, CalendarEventProps, CreationRequest, LegacyRow, RawAppointment, Rejection,
    RejectionReason, RequestedSlot, SourceShape,
};
pub use resolver::{FeedIndex, SchedulingConfig, SchedulingResolver};
pub use slots::{find_next_slot, round_up_to_slot, BusinessHours, SlotCandidate, SLOT_MINUTES};
