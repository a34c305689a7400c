// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers

use chrono::{DateTime, NaiveDate, Utc};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::commands::OutputFormat;
use super::output::{FeedFormatter, SnapshotFormatter};
use clinicsync::cache::RestoreOutcome;
use clinicsync::{CacheConfig, CachePersister, CacheStore, SchedulingConfig, SchedulingResolver, StorageType};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

fn snapshot_persister(
    path: PathBuf,
    buster: Option<String>,
) -> Result<(Arc<CacheStore>, CachePersister), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No snapshot directory at {:?}", path).into());
    }
    let mut config = CacheConfig::default();
    config.persistence.storage_type = StorageType::Sled;
    config.persistence.path = Some(path);
    if let Some(buster) = buster {
        config.persistence.buster = buster;
    }
    config.validate()?;
    let store = Arc::new(CacheStore::new(config));
    let persister = CachePersister::open(store.clone())?;
    Ok((store, persister))
}

/// Handle the inspect-snapshot command
///
/// The snapshot is restored into a throwaway store, so an unusable snapshot
/// is discarded exactly as it would be at application start.
pub fn handle_inspect_snapshot(path: PathBuf, buster: String, format: OutputFormat) -> CliResult {
    let (store, persister) = snapshot_persister(path.clone(), Some(buster))?;

    let outcome = runtime()?.block_on(persister.restore())?;
    match &outcome {
        RestoreOutcome::Missing => {
            println!("{}", format!("No snapshot stored at {:?}", path).yellow());
            return Ok(());
        }
        RestoreOutcome::Discarded(reason) => {
            println!("{}", format!("Snapshot discarded: {}", reason).red());
            return Ok(());
        }
        RestoreOutcome::Restored { .. } => {}
    }

    print!("{}", SnapshotFormatter::format(&store.entries(), &outcome, format));
    Ok(())
}

/// Handle the clear-snapshot command
pub fn handle_clear_snapshot(path: PathBuf, yes: bool) -> CliResult {
    if !yes {
        print!("Delete the cache snapshot at {:?}? [y/N] ", path);
        std::io::Write::flush(&mut std::io::stdout())?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    let (_, persister) = snapshot_persister(path.clone(), None)?;
    runtime()?.block_on(persister.discard())?;
    println!("{}", format!("Snapshot at {:?} cleared", path).green());
    Ok(())
}

fn load_scheduling_config(
    config: Option<PathBuf>,
    time_zone: Option<String>,
) -> Result<SchedulingConfig, Box<dyn std::error::Error>> {
    let mut config = match config {
        Some(path) => SchedulingConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => SchedulingConfig::default(),
    };
    if let Some(zone) = time_zone {
        config.time_zone = zone;
    }
    config.validate()?;
    Ok(config)
}

fn parse_day(value: Option<String>, flag: &str) -> Result<Option<NaiveDate>, Box<dyn std::error::Error>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .map_err(|e| format!("--{} expects YYYY-MM-DD: {}", flag, e).into())
        })
        .transpose()
}

/// Handle the bucket-feed command
pub fn handle_bucket_feed(
    file: &Path,
    config: Option<PathBuf>,
    time_zone: Option<String>,
    from: Option<String>,
    to: Option<String>,
    format: OutputFormat,
) -> CliResult {
    let resolver = SchedulingResolver::new(load_scheduling_config(config, time_zone)?)?;
    let feed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(file)?)?;

    let mut index = resolver.index_feed(&feed)?;
    match (parse_day(from, "from")?, parse_day(to, "to")?) {
        (None, None) => {}
        (from, to) => {
            let from = from.unwrap_or(NaiveDate::MIN);
            let to = to.unwrap_or(NaiveDate::MAX);
            index.days = index.days.restricted_to(from, to);
        }
    }

    print!("{}", FeedFormatter::format(&index, &resolver.time_zone().to_string(), format));
    Ok(())
}

/// Handle the next-slot command
pub fn handle_next_slot(at: Option<String>, config: Option<PathBuf>, time_zone: Option<String>) -> CliResult {
    let resolver = SchedulingResolver::new(load_scheduling_config(config, time_zone)?)?;
    let now = match at {
        Some(at) => DateTime::parse_from_rfc3339(&at)
            .map_err(|e| format!("--at expects an RFC 3339 timestamp: {}", e))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let slot = resolver.find_next_slot(now)?;
    println!(
        "{} {} ({})",
        "Next slot:".bold().green(),
        slot.date_time.format("%A %Y-%m-%d %H:%M"),
        resolver.time_zone()
    );
    println!(
        "{}",
        "Existing bookings are not checked; confirm availability before booking.".dimmed()
    );
    Ok(())
}
