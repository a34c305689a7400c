// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "clinicsync", version, about = "ClinicSync cache and scheduling tools")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (overridden by --verbose)
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// List the entries of a persisted cache snapshot
    InspectSnapshot {
        /// Snapshot directory
        #[arg(short, long)]
        path: PathBuf,

        /// Cache buster the snapshot must carry
        #[arg(long, default_value = clinicsync::VERSION)]
        buster: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Delete a persisted cache snapshot
    ClearSnapshot {
        #[arg(short, long)]
        path: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Canonicalize an appointment feed and group it by day
    BucketFeed {
        /// JSON file holding an array of appointment records
        file: PathBuf,

        /// Scheduling configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// IANA time zone, overrides the configuration
        #[arg(long)]
        time_zone: Option<String>,

        /// First day to show (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last day to show (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Suggest the next bookable slot
    NextSlot {
        /// Reference instant (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        time_zone: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}
