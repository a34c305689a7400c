// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for ClinicSync
//!
//! Offline tools around the library: inspect or clear a persisted cache
//! snapshot, bucket an appointment feed, suggest the next slot.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{handle_bucket_feed, handle_clear_snapshot, handle_inspect_snapshot, handle_next_slot};
