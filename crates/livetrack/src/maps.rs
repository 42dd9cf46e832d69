//! Deep links into an external map application.
//!
//! Opening a map is fire-and-forget: the launcher is spawned and never
//! awaited. Coordinates are validated first, so bad input never reaches
//! the launcher.

use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geo::Coordinate;

/// Search URL prefix; `<lat>,<lon>` is appended.
pub const DEFAULT_MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

/// Something that can open a URL outside this process.
pub trait MapLauncher: std::fmt::Debug {
    /// Hand `url` to the external application.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the application could not be started.
    fn launch(&self, url: &str) -> Result<()>;
}

/// Opens URLs with the desktop's default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(url: &str) -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl MapLauncher for SystemLauncher {
    fn launch(&self, url: &str) -> Result<()> {
        let mut cmd = Self::command(url);
        debug!(program = ?cmd.get_program(), url, "Launching external map");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| Error::Launch {
                message: format!("{}: {e}", cmd.get_program().to_string_lossy()),
            })
    }
}

/// The external map URL for `coordinate`.
#[must_use]
pub fn maps_url(base: &str, coordinate: Coordinate) -> String {
    format!("{base}{coordinate}")
}

/// Validate manually entered coordinates and open them in the map app.
///
/// Returns the URL that was opened.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if either field is empty, not a number
/// or out of range (the launcher is not called), or [`Error::Launch`] if
/// the launcher fails.
pub fn open_in_maps(
    latitude: &str,
    longitude: &str,
    base: &str,
    launcher: &dyn MapLauncher,
) -> Result<String> {
    let coordinate = Coordinate::parse(latitude, longitude)?;
    let url = maps_url(base, coordinate);
    launcher.launch(&url)?;
    info!(%coordinate, "Opened external map");
    Ok(url)
}
