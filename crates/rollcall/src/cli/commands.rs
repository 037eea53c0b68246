//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::history::HistoryQuery;
use crate::location::LocationTier;

/// Check command arguments.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Scanned QR payload
    pub qr: String,
}

/// Distance command arguments.
#[derive(Debug, Args)]
#[command(allow_negative_numbers = true)]
pub struct DistanceCommand {
    /// Latitude of the first point
    pub lat1: f64,
    /// Longitude of the first point
    pub lon1: f64,
    /// Latitude of the second point
    pub lat2: f64,
    /// Longitude of the second point
    pub lon2: f64,

    /// Also report whether the points are within this radius (meters)
    #[arg(short, long)]
    pub radius: Option<f64>,
}

/// Submit command arguments.
#[derive(Debug, Args)]
#[command(allow_negative_numbers = true)]
pub struct SubmitCommand {
    /// Scanned QR payload
    pub qr: String,

    /// Latitude to report (overrides the configured position)
    #[arg(long, requires = "lon")]
    pub lat: Option<f64>,

    /// Longitude to report (overrides the configured position)
    #[arg(long, requires = "lat")]
    pub lon: Option<f64>,

    /// Accuracy of the reported position in meters
    #[arg(long)]
    pub accuracy: Option<f64>,

    /// Location accuracy tier
    #[arg(short, long, value_enum)]
    pub tier: Option<TierArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Page to fetch
    #[arg(short, long, default_value = "1")]
    pub page: u32,

    /// Records per page
    #[arg(short, long)]
    pub limit: Option<u32>,

    /// Only verified attendances
    #[arg(long, conflicts_with = "unverified")]
    pub verified: bool,

    /// Only attendances outside the event radius
    #[arg(long)]
    pub unverified: bool,

    /// Only events whose name contains this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// First check-in day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub from: Option<NaiveDate>,

    /// Last check-in day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub to: Option<NaiveDate>,

    /// Group the records
    #[arg(short, long, value_enum)]
    pub group: Option<GroupBy>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

impl HistoryCommand {
    /// The verification filter requested, if any.
    #[must_use]
    pub fn verified_filter(&self) -> Option<bool> {
        match (self.verified, self.unverified) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }

    /// The server query for these arguments.
    #[must_use]
    pub fn query(&self) -> HistoryQuery {
        HistoryQuery {
            limit: self.limit,
            verified: self.verified_filter(),
            start_date: self.from,
            end_date: self.to,
            event_name: self.search.clone(),
            ..HistoryQuery::default()
        }
        .with_page(self.page)
    }
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Compute the statistics from the full history without asking the stats endpoint
    #[arg(short, long)]
    pub local: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Whoami command arguments.
#[derive(Debug, Args)]
pub struct WhoamiCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Location tier argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TierArg {
    /// Best accuracy, 15 s timeout
    High,
    /// Middle ground, 10 s timeout
    Balanced,
    /// Coarse, 5 s timeout
    Low,
}

impl From<TierArg> for LocationTier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::High => Self::High,
            TierArg::Balanced => Self::Balanced,
            TierArg::Low => Self::Low,
        }
    }
}

/// How to group history records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    /// One group per event
    Event,
    /// One group per check-in day
    Date,
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// JSON output
    Json,
}
