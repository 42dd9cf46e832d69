//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Where simulated fixes come from.
#[derive(Debug, Clone, Default, Args)]
pub struct DeviceArgs {
    /// JSON file with a list of `{latitude, longitude}` waypoints to replay
    #[arg(long, value_name = "FILE")]
    pub route: Option<PathBuf>,

    /// Refuse the location permission request
    #[arg(long)]
    pub deny_permission: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Publish as this user (overrides configuration)
    #[arg(short, long)]
    pub user_id: Option<String>,

    /// Track locally without sharing
    #[arg(long)]
    pub solo: bool,

    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Print one JSON frame per line
    #[arg(short, long)]
    pub json: bool,

    /// Simulated device options
    #[command(flatten)]
    pub device: DeviceArgs,
}

/// Locate command arguments.
#[derive(Debug, Args)]
pub struct LocateCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Simulated device options
    #[command(flatten)]
    pub device: DeviceArgs,
}

/// Publish command arguments.
#[derive(Debug, Args)]
pub struct PublishCommand {
    /// User to publish as
    #[arg(short, long)]
    pub user_id: String,

    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: String,

    /// Longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: String,
}

/// Snapshot command arguments.
#[derive(Debug, Args)]
pub struct SnapshotCommand {
    /// Build the snapshot as seen by this user (default: anonymous)
    #[arg(long = "as", value_name = "USER")]
    pub as_user: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Dump the stored tree as JSON, including users without a location
    #[arg(long, conflicts_with_all = ["json", "as_user"])]
    pub raw: bool,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// JSON presence tree, as printed by `snapshot --raw`
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// User whose presence is removed
    #[arg(short, long)]
    pub user_id: String,
}

/// Open-maps command arguments.
#[derive(Debug, Args)]
pub struct OpenMapsCommand {
    /// Latitude in degrees
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub lat: String,

    /// Longitude in degrees
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub lon: String,

    /// Print the URL instead of opening it
    #[arg(long)]
    pub dry_run: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
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
