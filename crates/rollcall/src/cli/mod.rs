//! Command-line interface for rollcall.
//!
//! This module provides the CLI structure and command handlers for the
//! `rollcall` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CheckCommand, ConfigCommand, DistanceCommand, GroupBy, HistoryCommand, OutputFormat,
    StatsCommand, SubmitCommand, TierArg, WhoamiCommand,
};

use crate::logging::Verbosity;

/// rollcall - Register event attendance from a QR code and your location
///
/// Scans are validated locally, then submitted together with the device
/// position to the attendance service, which decides whether you were close
/// enough to the event.
#[derive(Debug, Parser)]
#[command(name = "rollcall")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether a scanned payload is an event QR code
    Check(CheckCommand),

    /// Distance in meters between two points
    Distance(DistanceCommand),

    /// Register attendance for a scanned QR code
    Submit(SubmitCommand),

    /// List your past attendances
    History(HistoryCommand),

    /// Show attendance statistics
    Stats(StatsCommand),

    /// Confirm the configured token and show the signed-in user
    Whoami(WhoamiCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
