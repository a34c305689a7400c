// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! ClinicSync CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments first to get log level
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        // Default to Warn (can still be overridden by RUST_LOG env var)
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", "ClinicSync".bold().green(), clinicsync::VERSION);
            println!("Client-side data synchronization core for clinic management");
            Ok(())
        }

        Commands::InspectSnapshot {
            path,
            buster,
            format,
        } => cli::handle_inspect_snapshot(path, buster, format),

        Commands::ClearSnapshot { path, yes } => cli::handle_clear_snapshot(path, yes),

        Commands::BucketFeed {
            file,
            config,
            time_zone,
            from,
            to,
            format,
        } => cli::handle_bucket_feed(&file, config, time_zone, from, to, format),

        Commands::NextSlot {
            at,
            config,
            time_zone,
        } => cli::handle_next_slot(at, config, time_zone),
    }
}
