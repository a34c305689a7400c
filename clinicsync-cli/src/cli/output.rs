// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Formatting for CLI output

use chrono::Utc;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};

use super::commands::OutputFormat;
use clinicsync::cache::RestoreOutcome;
use clinicsync::scheduling::FeedIndex;
use clinicsync::{CacheEntry, CacheStatus};

/// Cache snapshot formatter
pub struct SnapshotFormatter;

impl SnapshotFormatter {
    pub fn format(entries: &[CacheEntry], outcome: &RestoreOutcome, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(entries, outcome),
            OutputFormat::Json => Self::format_json(entries),
        }
    }

    fn format_table(entries: &[CacheEntry], outcome: &RestoreOutcome) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", "Cache Snapshot".bold().green()));
        if let RestoreOutcome::Restored { entries: restored, dropped } = outcome {
            output.push_str(&format!("Entries restored: {}\n", restored));
            if *dropped > 0 {
                output.push_str(&format!("{}\n", format!("Expired entries dropped: {}", dropped).yellow()));
            }
        }
        output.push('\n');

        if entries.is_empty() {
            output.push_str(&format!("{}\n", "Snapshot holds no entries".yellow()));
            return output;
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            ["Key", "Status", "Fetched", "Age", "Size"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green))
                .collect::<Vec<_>>(),
        );

        let now = Utc::now();
        for entry in entries {
            let fetched = entry
                .fetched_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            let age = entry
                .age_at(now)
                .map(|age| format!("{}s", age.as_secs()))
                .unwrap_or_else(|| "-".to_string());
            let size = entry
                .data
                .as_ref()
                .map(|data| data.to_string().len())
                .unwrap_or(0);
            table.add_row(vec![
                Cell::new(entry.key.to_string()),
                Cell::new(entry.status).fg(Self::status_color(entry.status)),
                Cell::new(fetched),
                Cell::new(age),
                Cell::new(format!("{} B", size)),
            ]);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    fn format_json(entries: &[CacheEntry]) -> String {
        let json = serde_json::json!({
            "status": "success",
            "entries": entries,
            "count": entries.len(),
        });
        let mut output = serde_json::to_string_pretty(&json).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize snapshot to JSON\"}".to_string()
        });
        output.push('\n');
        output
    }

    fn status_color(status: CacheStatus) -> Color {
        match status {
            CacheStatus::Fresh => Color::Green,
            CacheStatus::Stale => Color::Yellow,
            CacheStatus::Error => Color::Red,
            CacheStatus::Fetching | CacheStatus::Idle => Color::Grey,
        }
    }
}

/// Appointment feed formatter
pub struct FeedFormatter;

impl FeedFormatter {
    pub fn format(index: &FeedIndex, zone: &str, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(index, zone),
            OutputFormat::Json => Self::format_json(index, zone),
        }
    }

    fn format_table(index: &FeedIndex, zone: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", "Appointments by Day".bold().green()));
        output.push_str(&format!("Time zone: {}\n", zone));
        output.push_str(&format!(
            "Appointments: {} over {} days\n\n",
            index.days.len(),
            index.days.day_count()
        ));

        for (date, bucket) in index.days.iter() {
            output.push_str(&format!("{}\n", date.format("%A %Y-%m-%d").to_string().bold()));
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(
                ["Time", "Animal", "Owner", "Subject", "Id"]
                    .iter()
                    .map(|h| Cell::new(h).fg(Color::Green))
                    .collect::<Vec<_>>(),
            );
            for appointment in bucket {
                table.add_row(vec![
                    appointment.time.format("%H:%M").to_string(),
                    appointment.animal_name.clone(),
                    appointment.owner_name.clone(),
                    appointment.subject.clone(),
                    appointment.id.clone(),
                ]);
            }
            output.push_str(&table.to_string());
            output.push_str("\n\n");
        }

        if !index.rejected.is_empty() {
            output.push_str(&format!("{}\n", "Rejected records:".bold().yellow()));
            for (i, rejection) in index.rejected.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, rejection.to_string().yellow()));
            }
        }

        output
    }

    fn format_json(index: &FeedIndex, zone: &str) -> String {
        let json = serde_json::json!({
            "status": "success",
            "timeZone": zone,
            "days": index.days,
            "rejected": index
                .rejected
                .iter()
                .map(|r| serde_json::json!({
                    "shape": r.shape,
                    "id": r.record_id,
                    "reason": r.reason.to_string(),
                }))
                .collect::<Vec<_>>(),
        });
        let mut output = serde_json::to_string_pretty(&json).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize feed to JSON\"}".to_string()
        });
        output.push('\n');
        output
    }
}
