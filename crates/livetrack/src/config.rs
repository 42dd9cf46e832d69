//! Configuration management for livetrack.
//!
//! Configuration is layered with figment: built-in defaults, then a TOML
//! file, then `LIVETRACK_` environment variables. Nested keys use a double
//! underscore, e.g. `LIVETRACK_SESSION__USER_ID=u1`.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::{Coordinate, Region};
use crate::maps::DEFAULT_MAPS_SEARCH_URL;
use crate::position::{Accuracy, WatchOptions};
use crate::presence::Identity;

const CONFIG_FILE_NAME: &str = "config.toml";

const DATA_DIR_NAME: &str = "livetrack";

const DATABASE_FILE_NAME: &str = "presence.db";

const ENV_PREFIX: &str = "LIVETRACK_";

/// Sampling profile while sharing.
const SHARED_TIME_INTERVAL_MS: u64 = 5000;

/// Sampling profile for the single-user map.
const SOLO_TIME_INTERVAL_MS: u64 = 1000;
const SOLO_DISTANCE_INTERVAL_METERS: f64 = 1.0;

/// Application configuration.
///
/// Sources, highest precedence first:
/// 1. Environment variables (prefixed with `LIVETRACK_`)
/// 2. TOML config file at `<config_dir>/livetrack/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Who this device is and how it participates.
    pub session: SessionConfig,
    /// Location watch options.
    pub location: LocationConfig,
    /// Shared store backend.
    pub store: StoreConfig,
    /// Initial viewport and external map settings.
    pub map: MapConfig,
}

/// How a session participates in sharing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Publish to and observe the shared store.
    #[default]
    Shared,
    /// Track locally only.
    Solo,
}

/// Session-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// This device's user id. Absent or blank means observe only.
    pub user_id: Option<String>,
    /// Shared or solo.
    pub mode: SessionMode,
    /// Recenter on other users' locations while anonymous.
    pub follow_when_anonymous: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            mode: SessionMode::Shared,
            follow_when_anonymous: true,
        }
    }
}

/// Location watch configuration.
///
/// Unset intervals fall back to the profile of the session mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Desired accuracy tier.
    pub accuracy: Accuracy,
    /// Minimum time between samples in milliseconds.
    pub time_interval_ms: Option<u64>,
    /// Minimum distance between delivered samples in meters.
    pub distance_interval_meters: Option<f64>,
}

/// Which shared store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// A database file shared by every process on this machine.
    #[default]
    Sqlite,
    /// A private in-process store.
    Memory,
}

/// Shared store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreBackend,
    /// Path to the database file.
    /// Defaults to `<data_dir>/livetrack/presence.db`
    pub database_path: Option<PathBuf>,
    /// How often to check for changes made by other processes.
    pub poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: None,
            poll_interval_ms: 500,
        }
    }
}

/// Map configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Latitude shown before the first fix.
    pub initial_latitude: f64,
    /// Longitude shown before the first fix.
    pub initial_longitude: f64,
    /// Viewport latitude span in degrees.
    pub latitude_delta: f64,
    /// Viewport longitude span in degrees.
    pub longitude_delta: f64,
    /// Prefix for external map links; `<lat>,<lon>` is appended.
    pub search_url: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_latitude: 10.84952,
            initial_longitude: 106.799_865,
            latitude_delta: 0.009,
            longitude_delta: 0.009,
            search_url: DEFAULT_MAPS_SEARCH_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.location.time_interval_ms == Some(0) {
            return Err(invalid("location.time_interval_ms must be greater than 0"));
        }

        if let Some(distance) = self.location.distance_interval_meters {
            if !distance.is_finite() || distance < 0.0 {
                return Err(invalid(format!(
                    "location.distance_interval_meters must be a non-negative number, got {distance}"
                )));
            }
        }

        if self.store.poll_interval_ms == 0 {
            return Err(invalid("store.poll_interval_ms must be greater than 0"));
        }

        for (key, delta) in [
            ("map.latitude_delta", self.map.latitude_delta),
            ("map.longitude_delta", self.map.longitude_delta),
        ] {
            if !delta.is_finite() || delta <= 0.0 {
                return Err(invalid(format!("{key} must be positive, got {delta}")));
            }
        }

        Coordinate::new(self.map.initial_latitude, self.map.initial_longitude).map_err(|e| {
            invalid(format!("map initial position is not a valid coordinate: {e}"))
        })?;

        if self.map.search_url.trim().is_empty() {
            return Err(invalid("map.search_url must not be empty"));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Watch options for the configured session mode.
    ///
    /// Explicitly configured intervals always win over the mode's profile.
    #[must_use]
    pub fn watch_options(&self) -> WatchOptions {
        let (default_interval_ms, default_distance) = match self.session.mode {
            SessionMode::Shared => (SHARED_TIME_INTERVAL_MS, None),
            SessionMode::Solo => (SOLO_TIME_INTERVAL_MS, Some(SOLO_DISTANCE_INTERVAL_METERS)),
        };

        WatchOptions {
            accuracy: self.location.accuracy,
            time_interval: Duration::from_millis(
                self.location.time_interval_ms.unwrap_or(default_interval_ms),
            ),
            distance_interval_meters: self.location.distance_interval_meters.or(default_distance),
        }
    }

    /// The viewport shown before the first fix.
    ///
    /// Falls back to the built-in default position if the configured one is
    /// out of range.
    #[must_use]
    pub fn initial_region(&self) -> Region {
        let center = Coordinate::new(self.map.initial_latitude, self.map.initial_longitude)
            .unwrap_or_else(|_| {
                let defaults = MapConfig::default();
                Coordinate {
                    latitude: defaults.initial_latitude,
                    longitude: defaults.initial_longitude,
                }
            });
        Region::around(center, self.map.latitude_delta, self.map.longitude_delta)
    }

    /// The session identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.session.user_id.as_deref())
    }

    /// Get the store poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.store.poll_interval_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.session.user_id.is_none());
        assert_eq!(config.session.mode, SessionMode::Shared);
        assert!(config.session.follow_when_anonymous);
        assert_eq!(config.location.accuracy, Accuracy::High);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.poll_interval_ms, 500);
    }

    #[test]
    fn test_default_map_config() {
        let map = MapConfig::default();

        assert!((map.initial_latitude - 10.84952).abs() < f64::EPSILON);
        assert!((map.initial_longitude - 106.799_865).abs() < f64::EPSILON);
        assert!((map.latitude_delta - 0.009).abs() < f64::EPSILON);
        assert_eq!(
            map.search_url,
            "https://www.google.com/maps/search/?api=1&query="
        );
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_time_interval() {
        let mut config = Config::default();
        config.location.time_interval_ms = Some(0);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("time_interval_ms"));
    }

    #[test]
    fn test_validate_negative_distance_interval() {
        let mut config = Config::default();
        config.location.distance_interval_meters = Some(-1.0);
        assert!(config.validate().is_err());

        config.location.distance_interval_meters = Some(f64::NAN);
        assert!(config.validate().is_err());

        config.location.distance_interval_meters = Some(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.store.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_non_positive_delta() {
        let mut config = Config::default();
        config.map.longitude_delta = 0.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("map.longitude_delta"));
    }

    #[test]
    fn test_validate_invalid_initial_position() {
        let mut config = Config::default();
        config.map.initial_latitude = 120.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("initial position"));
    }

    #[test]
    fn test_validate_empty_search_url() {
        let mut config = Config::default();
        config.map.search_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("presence.db"));
        assert!(path.to_string_lossy().contains("livetrack"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.store.database_path = Some(PathBuf::from("/custom/presence.sqlite"));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/presence.sqlite")
        );
    }

    #[test]
    fn test_watch_options_shared_profile() {
        let options = Config::default().watch_options();
        assert_eq!(options.accuracy, Accuracy::High);
        assert_eq!(options.time_interval, Duration::from_millis(5000));
        assert!(options.distance_interval_meters.is_none());
    }

    #[test]
    fn test_watch_options_solo_profile() {
        let mut config = Config::default();
        config.session.mode = SessionMode::Solo;

        let options = config.watch_options();
        assert_eq!(options.time_interval, Duration::from_millis(1000));
        assert_eq!(options.distance_interval_meters, Some(1.0));
    }

    #[test]
    fn test_watch_options_explicit_values_win() {
        let mut config = Config::default();
        config.session.mode = SessionMode::Solo;
        config.location.time_interval_ms = Some(250);
        config.location.distance_interval_meters = Some(5.0);

        let options = config.watch_options();
        assert_eq!(options.time_interval, Duration::from_millis(250));
        assert_eq!(options.distance_interval_meters, Some(5.0));
    }

    #[test]
    fn test_initial_region() {
        let region = Config::default().initial_region();
        assert!((region.center.latitude - 10.84952).abs() < f64::EPSILON);
        assert!((region.longitude_delta - 0.009).abs() < f64::EPSILON);
    }

    #[test]
    fn test_identity_from_config() {
        let mut config = Config::default();
        assert!(config.identity().is_anonymous());

        config.session.user_id = Some("  ".to_string());
        assert!(config.identity().is_anonymous());

        config.session.user_id = Some("u1".to_string());
        assert_eq!(config.identity().user_id(), Some("u1"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("livetrack"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.map, MapConfig::default());
        assert_eq!(config.store.poll_interval_ms, 500);
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "livetrack_test_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[session]
user_id = "u7"
mode = "solo"

[location]
accuracy = "balanced"

[store]
backend = "memory"
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.session.user_id.as_deref(), Some("u7"));
        assert_eq!(config.session.mode, SessionMode::Solo);
        assert_eq!(config.location.accuracy, Accuracy::Balanced);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.poll_interval_ms, 500);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "livetrack_test_bad_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[store]\npoll_interval_ms = 0\n").unwrap();

        let result = Config::load_from(Some(path.clone()));
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_session_mode_serialize() {
        let json = serde_json::to_string(&SessionMode::Solo).unwrap();
        assert_eq!(json, r#""solo""#);
    }

    #[test]
    fn test_store_config_deserialize() {
        let json = r#"{"backend": "memory"}"#;
        let store: StoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(store.backend, StoreBackend::Memory);
        assert_eq!(store.poll_interval_ms, 500);
    }
}
