//! CLI module - Command-line interface for reelsync
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use crate::constants::limits::MAX_LOOKBACK_DAYS;
use clap::{Parser, Subcommand};

/// reelsync - Incremental TMDB catalog updater
/// Keeps a local movie / TV database in step with the upstream change feed
#[derive(Parser)]
#[command(name = "reelsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one incremental update
    #[command(alias = "u")]
    Update {
        /// Fetch and write CSV previews without touching the database
        #[arg(long)]
        dry_run: bool,
        /// Only process the first N changed ids of each kind
        #[arg(long, value_name = "N")]
        sample: Option<usize>,
        /// Look back N days instead of resuming from the last checkpoint
        #[arg(
            long,
            value_name = "N",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_LOOKBACK_DAYS))
        )]
        force_days: Option<u32>,
        /// Run even when no recent offsite backup exists
        #[arg(long)]
        skip_backup_check: bool,
    },

    /// Upload a copy of the database to the offsite store and apply retention
    Backup,

    /// Check that a recent offsite backup exists
    VerifyBackup,

    /// Manage rollback snapshots
    Snapshots {
        #[command(subcommand)]
        command: SnapshotCommands,
    },

    /// Show checkpoint, row counts, snapshots and backup state
    Status,

    /// Run as background daemon with scheduler
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// List retained snapshot sets, newest first
    #[command(alias = "ls")]
    List,
    /// Take a snapshot set now
    Create,
    /// Replace live table contents with a snapshot set
    Restore {
        /// Set timestamp as shown by `snapshots list` (YYYYMMDD_HHMMSS)
        timestamp: String,
    },
}

pub use commands::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_flags() {
        let cli = Cli::parse_from([
            "reelsync",
            "update",
            "--dry-run",
            "--sample",
            "10",
            "--force-days",
            "30",
        ]);
        match cli.command {
            Some(Commands::Update {
                dry_run,
                sample,
                force_days,
                skip_backup_check,
            }) => {
                assert!(dry_run);
                assert_eq!(sample, Some(10));
                assert_eq!(force_days, Some(30));
                assert!(!skip_backup_check);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn rejects_out_of_range_force_days() {
        assert!(Cli::try_parse_from(["reelsync", "update", "--force-days", "0"]).is_err());
        assert!(
            Cli::try_parse_from(["reelsync", "update", "--force-days", "4294967295"]).is_err()
        );
        assert!(Cli::try_parse_from(["reelsync", "update", "--force-days", "36500"]).is_ok());
    }

    #[test]
    fn parses_snapshot_restore() {
        let cli = Cli::parse_from(["reelsync", "snapshots", "restore", "20261018_030000"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Snapshots {
                command: SnapshotCommands::Restore { .. }
            })
        ));
    }
}
