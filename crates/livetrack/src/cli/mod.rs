//! Command-line interface for livetrack.
//!
//! This module provides the CLI structure and text rendering for the
//! `livetrack` binary.

mod commands;
pub mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    ClearCommand, ConfigCommand, DeviceArgs, ImportCommand, LocateCommand, OpenMapsCommand,
    PublishCommand, SnapshotCommand, StatusCommand, WatchCommand,
};

/// livetrack - Share your live location and watch everyone else's
///
/// Tracks this device's position, keeps a local route and distance, and
/// mirrors both into a shared presence store that other sessions observe.
#[derive(Debug, Parser)]
#[command(name = "livetrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
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
    /// Run a live tracking session on the simulated device
    Watch(WatchCommand),

    /// Take a single position fix
    Locate(LocateCommand),

    /// Publish one position for a user
    Publish(PublishCommand),

    /// Print everyone's current presence
    Snapshot(SnapshotCommand),

    /// Remove a user's presence from the store
    Clear(ClearCommand),

    /// Load a JSON presence tree into the store
    Import(ImportCommand),

    /// Open a position in the external map application
    OpenMaps(OpenMapsCommand),

    /// Show store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
