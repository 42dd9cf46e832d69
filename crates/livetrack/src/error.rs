//! Error types for livetrack.
//!
//! This module defines all error types used throughout the livetrack crate.
//! Every error can be turned into the status line shown to the user; none of
//! them are fatal to a running session.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for livetrack operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Location Errors ===
    /// Foreground location access was refused.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description shown to the user.
        message: String,
    },

    /// The platform could not produce a position fix.
    #[error("location unavailable: {message}")]
    LocationUnavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// A location watch is already active on this source.
    #[error("location watch already active")]
    AlreadyWatching,

    // === Input Errors ===
    /// User-supplied input failed validation.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Validation message shown to the user.
        message: String,
    },

    // === Shared Store Errors ===
    /// The shared store could not be reached.
    #[error("shared store unreachable: {message}")]
    StoreUnreachable {
        /// Description of what went wrong.
        message: String,
    },

    /// The presence database could not be opened.
    #[error("cannot open presence database {path}: {source}")]
    DatabaseOpen {
        /// Database file that was being opened.
        path: PathBuf,
        /// Error reported by SQLite.
        #[source]
        source: rusqlite::Error,
    },

    /// A statement against the presence database failed.
    #[error("presence database error: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// The presence schema could not be brought up to date.
    #[error("presence schema migration failed: {message}")]
    DatabaseMigration {
        /// Which step failed and why.
        message: String,
    },

    // === Configuration Errors ===
    /// The configuration layers could not be merged or parsed.
    #[error("cannot load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// A configuration value is out of range.
    #[error("configuration rejected: {message}")]
    ConfigValidation {
        /// The offending key and the reason.
        message: String,
    },

    // === External Navigation Errors ===
    /// The external map application could not be launched.
    #[error("failed to open maps: {message}")]
    Launch {
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// Reading a file or talking to a child process failed.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The data directory could not be created.
    #[error("cannot create data directory {path}: {source}")]
    DirectoryCreate {
        /// Directory that was being created.
        path: PathBuf,
        /// Error reported by the file system.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// A presence tree, route file or frame could not be (de)serialized.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// A broken invariant inside livetrack.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for livetrack operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a permission denied error.
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a location unavailable error.
    #[must_use]
    pub fn location_unavailable(message: impl Into<String>) -> Self {
        Self::LocationUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a store unreachable error.
    #[must_use]
    pub fn store_unreachable(message: impl Into<String>) -> Self {
        Self::StoreUnreachable {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether location access was refused.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Check if this error is expected to clear up on its own.
    ///
    /// Transient errors leave the last known snapshot on screen.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LocationUnavailable { .. }
                | Self::StoreUnreachable { .. }
                | Self::DatabaseQuery(_)
        )
    }

    /// The status line shown to the user for this error.
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            Self::PermissionDenied { message } => format!("Permission Denied: {message}"),
            Self::LocationUnavailable { message } => {
                format!("Location unavailable ({message}), showing last known positions")
            }
            Self::InvalidInput { message } => message.clone(),
            Self::StoreUnreachable { .. } | Self::DatabaseQuery(_) => {
                "Live sharing is offline, showing last known positions".to_string()
            }
            Self::AlreadyWatching => "Location is already being watched".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::permission_denied("Location permission is required.");
        assert_eq!(
            err.to_string(),
            "permission denied: Location permission is required."
        );

        let err = Error::AlreadyWatching;
        assert_eq!(err.to_string(), "location watch already active");
    }

    #[test]
    fn test_is_permission_error() {
        assert!(Error::permission_denied("no").is_permission_error());
        assert!(!Error::invalid_input("bad").is_permission_error());
    }

    #[test]
    fn test_is_transient() {
        assert!(Error::location_unavailable("no fix").is_transient());
        assert!(Error::store_unreachable("offline").is_transient());
        assert!(!Error::permission_denied("no").is_transient());
        assert!(!Error::invalid_input("bad").is_transient());
        assert!(!Error::AlreadyWatching.is_transient());
    }

    #[test]
    fn test_status_message_permission() {
        let msg = Error::permission_denied("Location permission is required.").status_message();
        assert!(msg.starts_with("Permission Denied"));
        assert!(msg.contains("Location permission is required."));
    }

    #[test]
    fn test_status_message_invalid_input_is_verbatim() {
        let msg = Error::invalid_input("Please enter both latitude and longitude").status_message();
        assert_eq!(msg, "Please enter both latitude and longitude");
    }

    #[test]
    fn test_status_message_store_unreachable() {
        let msg = Error::store_unreachable("connection reset").status_message();
        assert!(msg.contains("offline"));
    }

    #[test]
    fn test_status_message_location_unavailable() {
        let msg = Error::location_unavailable("no satellites").status_message();
        assert!(msg.contains("no satellites"));
        assert!(msg.contains("last known"));
    }

    #[test]
    fn test_status_message_falls_back_to_display() {
        let err = Error::internal("push key clock went backwards");
        assert_eq!(
            err.status_message(),
            "internal error: push key clock went backwards"
        );
    }

    #[test]
    fn test_launch_error_display() {
        let err = Error::Launch {
            message: "xdg-open not found".to_string(),
        };
        assert!(err.to_string().contains("xdg-open"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_route_file_missing_is_io() {
        let err: Error = std::fs::read_to_string("/nonexistent/livetrack/route.json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("I/O failure"));
    }

    #[test]
    fn test_sqlite_failure_reads_as_offline() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let sqlite_err = conn
            .execute("INSERT INTO missing_table VALUES (1)", [])
            .unwrap_err();
        let err: Error = sqlite_err.into();

        assert!(matches!(err, Error::DatabaseQuery(_)));
        assert!(err.is_transient());
        assert!(err.status_message().contains("offline"));
    }

    #[test]
    fn test_malformed_presence_tree() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{\"u1\": ")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().starts_with("malformed JSON"));
    }

    #[test]
    fn test_migration_error_names_step() {
        let err = Error::DatabaseMigration {
            message: "schema version 9 is newer than supported version 2".to_string(),
        };
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_config_validation_names_key() {
        let err = Error::ConfigValidation {
            message: "store.poll_interval_ms must be greater than 0".to_string(),
        };
        assert_eq!(
            err.status_message(),
            "configuration rejected: store.poll_interval_ms must be greater than 0"
        );
    }

    #[test]
    fn test_directory_create_names_path() {
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/readonly/livetrack"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert!(err.to_string().contains("/readonly/livetrack"));
        assert!(!err.is_permission_error());
    }
}
