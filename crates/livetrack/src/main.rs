//! `livetrack` - CLI for live location sharing
//!
//! Runs tracking sessions against the simulated device and inspects or edits
//! the shared presence store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use livetrack::cli::render::{self, TerminalSink};
use livetrack::cli::{
    ClearCommand, Cli, Command, ConfigCommand, DeviceArgs, ImportCommand, LocateCommand,
    OpenMapsCommand, PublishCommand, SnapshotCommand, StatusCommand, WatchCommand,
};
use livetrack::config::{SessionMode, StoreBackend};
use livetrack::maps::{self, MapLauncher, SystemLauncher};
use livetrack::position::SimulatedProvider;
use livetrack::presence::PublishOutcome;
use livetrack::store::{self, SharedStore};
use livetrack::{
    init_logging, Config, Coordinate, Error, Identity, PositionSource, PresencePublisher,
    PresenceSubscriber, Result, SqliteStore, TrackingSession,
};
use livetrack_sim::{PermissionGate, Route, SimulatedLocationService, Waypoint};

// Default simulated walk when no route file is given.
const WALK_STEP_METERS: f64 = 12.0;
const WALK_STEPS: usize = 10_000;
const WALK_BEARING_DEGREES: f64 = 45.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    let outcome = match cli.command {
        Command::Watch(cmd) => handle_watch(&config, cmd).await,
        Command::Locate(cmd) => handle_locate(&config, &cmd).await,
        Command::Publish(cmd) => handle_publish(&config, &cmd).await,
        Command::Snapshot(cmd) => handle_snapshot(&config, &cmd).await,
        Command::Clear(cmd) => handle_clear(&config, &cmd).await,
        Command::Import(cmd) => handle_import(&config, &cmd).await,
        Command::OpenMaps(cmd) => handle_open_maps(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    };

    outcome.map_err(|e| anyhow::anyhow!(e.status_message()))
}

fn simulated_provider(config: &Config, device: &DeviceArgs) -> Result<SimulatedProvider> {
    let route = match &device.route {
        Some(path) => Route::from_file(path).map_err(|e| {
            Error::invalid_input(format!("cannot use route {}: {e}", path.display()))
        })?,
        None => {
            let center = config.initial_region().center;
            Route::walk(
                Waypoint::new(center.latitude, center.longitude),
                WALK_BEARING_DEGREES,
                WALK_STEP_METERS,
                WALK_STEPS,
            )
        }
    };
    let gate = PermissionGate::new(!device.deny_permission);
    Ok(SimulatedProvider::new(
        SimulatedLocationService::with_permissions(route, gate),
    ))
}

fn open_store(config: &Config) -> Result<Arc<dyn SharedStore>> {
    store::open_configured(&config.store, &config.database_path())
}

async fn shutdown_signal(duration: Option<u64>) {
    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        }
    }
}

async fn handle_watch(config: &Config, cmd: WatchCommand) -> Result<()> {
    let mut config = config.clone();
    if let Some(user_id) = cmd.user_id {
        config.session.user_id = Some(user_id);
    }
    if cmd.solo {
        config.session.mode = SessionMode::Solo;
    }

    let provider = simulated_provider(&config, &cmd.device)?;
    let mut source = PositionSource::new(Arc::new(provider));
    let region = config.initial_region();

    let session = match config.session.mode {
        SessionMode::Solo => TrackingSession::solo(region),
        SessionMode::Shared => TrackingSession::shared(
            region,
            open_store(&config)?,
            config.identity(),
            config.session.follow_when_anonymous,
        ),
    };
    info!(identity = %config.identity(), mode = ?config.session.mode, "Starting watch");

    let mut sink = TerminalSink::new(cmd.json);
    let summary = session
        .run(
            &mut source,
            config.watch_options(),
            &mut sink,
            shutdown_signal(cmd.duration),
        )
        .await;

    if cmd.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!();
        print!("{}", render::summary_text(&summary));
    }
    Ok(())
}

async fn handle_locate(config: &Config, cmd: &LocateCommand) -> Result<()> {
    let provider = simulated_provider(config, &cmd.device)?;
    let source = PositionSource::new(Arc::new(provider));
    let sample = source.current_position(config.location.accuracy).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&sample)?);
    } else {
        println!("Latitude:  {}", sample.coordinate.latitude);
        println!("Longitude: {}", sample.coordinate.longitude);
        if let Some(accuracy) = sample.accuracy_meters {
            println!("Accuracy:  {accuracy} m");
        }
        println!(
            "Maps:      {}",
            maps::maps_url(&config.map.search_url, sample.coordinate)
        );
    }
    Ok(())
}

async fn handle_publish(config: &Config, cmd: &PublishCommand) -> Result<()> {
    let coordinate = Coordinate::parse(&cmd.lat, &cmd.lon)?;
    let publisher = PresencePublisher::new(open_store(config)?, Identity::named(&cmd.user_id));

    match publisher.publish(coordinate).await? {
        PublishOutcome::Published { key } => {
            println!("Published {coordinate} for {} ({key})", publisher.identity());
        }
        PublishOutcome::Skipped => println!("No user id given; nothing was published."),
    }
    Ok(())
}

async fn handle_snapshot(config: &Config, cmd: &SnapshotCommand) -> Result<()> {
    let store = open_store(config)?;
    if cmd.raw {
        println!("{}", store::presence_to_json(&store.read_all().await?)?);
        return Ok(());
    }

    let identity = Identity::new(cmd.as_user.as_deref());
    let subscriber = PresenceSubscriber::new(store, identity)
        .with_follow(config.session.follow_when_anonymous);
    let update = subscriber.fetch().await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&update.snapshot)?);
    } else {
        print!("{}", render::snapshot_table(&update.snapshot));
        if let Some(center) = update.recenter {
            println!("Following: {center}");
        }
    }
    Ok(())
}

async fn handle_clear(config: &Config, cmd: &ClearCommand) -> Result<()> {
    let store = open_store(config)?;
    if store.remove_user(&cmd.user_id).await? {
        println!("Removed presence for {}", cmd.user_id);
    } else {
        println!("No presence stored for {}", cmd.user_id);
    }
    Ok(())
}

async fn handle_import(config: &Config, cmd: &ImportCommand) -> Result<()> {
    let json = std::fs::read_to_string(&cmd.file)?;
    let presence = store::presence_from_json(&json)?;
    let points = store::import_presence(open_store(config)?.as_ref(), &presence).await?;
    println!(
        "Imported {} users ({points} route points) from {}",
        presence.len(),
        cmd.file.display()
    );
    Ok(())
}

/// Prints the URL instead of opening it.
#[derive(Debug)]
struct PrintLauncher;

impl MapLauncher for PrintLauncher {
    fn launch(&self, url: &str) -> Result<()> {
        println!("{url}");
        Ok(())
    }
}

fn handle_open_maps(config: &Config, cmd: &OpenMapsCommand) -> Result<()> {
    let launcher: &dyn MapLauncher = if cmd.dry_run {
        &PrintLauncher
    } else {
        &SystemLauncher
    };
    maps::open_in_maps(&cmd.lat, &cmd.lon, &config.map.search_url, launcher)?;
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> Result<()> {
    let database_path = config.database_path();
    let stats = match config.store.backend {
        StoreBackend::Sqlite if database_path.exists() => {
            Some(SqliteStore::open(&database_path)?.stats()?)
        }
        _ => None,
    };

    if cmd.json {
        let status = serde_json::json!({
            "platform": livetrack_sim::platform_name(),
            "backend": config.store.backend,
            "database_path": database_path,
            "users": stats.as_ref().map(|s| s.users),
            "located_users": stats.as_ref().map(|s| s.located_users),
            "route_points": stats.as_ref().map(|s| s.route_points),
            "db_size_bytes": stats.as_ref().map(|s| s.db_size_bytes),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("livetrack status");
        println!("----------------");
        println!("Platform:      {}", livetrack_sim::platform_name());
        println!("Backend:       {:?}", config.store.backend);
        println!("Database:      {}", database_path.display());
        match &stats {
            Some(stats) => print!("{}", render::stats_text(stats)),
            None => println!("(no shared data on disk)"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Session]");
                println!("  User id:            {}", config.identity());
                println!("  Mode:               {:?}", config.session.mode);
                println!(
                    "  Follow anonymously: {}",
                    config.session.follow_when_anonymous
                );
                println!();
                let options = config.watch_options();
                println!("[Location]");
                println!("  Accuracy:           {}", options.accuracy);
                println!(
                    "  Interval:           {} ms",
                    options.time_interval.as_millis()
                );
                match options.distance_interval_meters {
                    Some(meters) => println!("  Distance interval:  {meters} m"),
                    None => println!("  Distance interval:  none"),
                }
                println!();
                println!("[Store]");
                println!("  Backend:            {:?}", config.store.backend);
                println!("  Database path:      {}", config.database_path().display());
                println!("  Poll interval:      {} ms", config.store.poll_interval_ms);
                println!();
                let region = config.initial_region();
                println!("[Map]");
                println!("  Initial center:     {}", region.center);
                println!(
                    "  Viewport:           {} x {}",
                    region.latitude_delta, region.longitude_delta
                );
                println!("  Search URL:         {}", config.map.search_url);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
