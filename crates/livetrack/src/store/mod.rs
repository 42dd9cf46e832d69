//! Shared Store: the multi-writer presence tree every participant sees.
//!
//! The tree is keyed by user id. Each entry holds the user's latest
//! `location` (overwrite semantics) and `routeCoordinates`, a keyed
//! collection appended with generated keys that sort in insertion order:
//!
//! ```json
//! {
//!   "u1": {
//!     "location": { "latitude": 10.0, "longitude": 106.01 },
//!     "routeCoordinates": {
//!       "0018f2a1b3c4d000000": { "latitude": 10.0, "longitude": 106.0 },
//!       "0018f2a1b3c4e000000": { "latitude": 10.0, "longitude": 106.01 }
//!     }
//!   }
//! }
//! ```
//!
//! Writers only ever touch their own entry. There is no locking and no
//! version check; `location` is last-write-wins.

pub mod memory;
pub mod push_key;
pub mod sqlite;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::geo::Coordinate;

pub use memory::MemoryStore;
pub use push_key::{PushKeyGenerator, RouteKey};
pub use sqlite::{SqliteStore, StoreStats};

/// Capacity of each store's change notification channel.
pub(crate) const CHANGE_BUFFER: usize = 256;

/// Opaque participant identifier.
pub type UserId = String;

/// One user's raw entry as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUserEntry {
    /// Latest position, absent if never set or cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
    /// Route history keyed by push key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub route_coordinates: BTreeMap<RouteKey, Coordinate>,
}

/// The whole presence tree, keyed by user id.
pub type RawPresence = BTreeMap<UserId, RawUserEntry>;

/// Parse a presence tree from its JSON wire form.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if the document is malformed.
pub fn presence_from_json(json: &str) -> Result<RawPresence> {
    Ok(serde_json::from_str(json)?)
}

/// Render a presence tree in its JSON wire form.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if serialization fails.
pub fn presence_to_json(presence: &RawPresence) -> Result<String> {
    Ok(serde_json::to_string_pretty(presence)?)
}

/// Write a presence tree into `store`, one user at a time.
///
/// Route points are appended in key order under freshly generated keys,
/// then the location is set. Returns the number of route points written.
///
/// # Errors
///
/// Returns the first store error; users before it stay written.
pub async fn import_presence(store: &dyn SharedStore, presence: &RawPresence) -> Result<usize> {
    let mut points = 0;
    for (user_id, entry) in presence {
        for coordinate in entry.route_coordinates.values() {
            store.push_route_coordinate(user_id, *coordinate).await?;
            points += 1;
        }
        if let Some(location) = entry.location {
            store.set_location(user_id, location).await?;
        }
        debug!(user_id, points = entry.route_coordinates.len(), "Imported user presence");
    }
    Ok(points)
}

/// What changed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A user's `location` was overwritten.
    Location,
    /// A coordinate was appended to a user's route.
    RouteAppended,
    /// A user's entry was removed.
    Removed,
    /// Another process changed the store; details unknown.
    External,
}

/// A change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// The user whose entry changed; empty for [`ChangeKind::External`].
    pub user_id: UserId,
    /// What changed.
    pub kind: ChangeKind,
}

impl StoreEvent {
    pub(crate) fn new(user_id: &str, kind: ChangeKind) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
        }
    }
}

/// A real-time presence store with set, push and change notification.
#[async_trait::async_trait]
pub trait SharedStore: Send + Sync + Debug {
    /// The name of this backend (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Overwrite `user_id`'s latest location.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnreachable`] if the write fails.
    async fn set_location(&self, user_id: &str, coordinate: Coordinate) -> Result<()>;

    /// Append to `user_id`'s route under a freshly generated key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnreachable`] if the write fails.
    async fn push_route_coordinate(&self, user_id: &str, coordinate: Coordinate)
        -> Result<RouteKey>;

    /// Read the whole presence tree.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnreachable`] if the read fails.
    async fn read_all(&self) -> Result<RawPresence>;

    /// Delete `user_id`'s entry. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnreachable`] if the write fails.
    async fn remove_user(&self, user_id: &str) -> Result<bool>;

    /// Subscribe to change notifications for the whole tree.
    fn changes(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Open the store selected by configuration.
///
/// A SQLite store also starts polling for commits made by other processes,
/// so this must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn open_configured(
    config: &StoreConfig,
    database_path: &Path,
) -> Result<Arc<dyn SharedStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            let store = Arc::new(SqliteStore::open(database_path)?);
            store.spawn_change_poller(Duration::from_millis(config.poll_interval_ms));
            Ok(store)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_entry_wire_names() {
        let mut entry = RawUserEntry {
            location: Some(Coordinate::new(10.0, 106.0).unwrap()),
            ..RawUserEntry::default()
        };
        entry.route_coordinates.insert(
            RouteKey::from("k1"),
            Coordinate::new(10.0, 106.0).unwrap(),
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"location\""));
        assert!(json.contains("\"routeCoordinates\""));
        assert!(json.contains("\"k1\""));
    }

    #[test]
    fn test_presence_from_json_missing_fields() {
        let json = r#"{
            "u1": { "routeCoordinates": { "a": { "latitude": 1.0, "longitude": 2.0 } } },
            "u2": { "location": { "latitude": 3.0, "longitude": 4.0 } }
        }"#;
        let presence = presence_from_json(json).unwrap();
        assert_eq!(presence.len(), 2);
        assert!(presence["u1"].location.is_none());
        assert_eq!(presence["u1"].route_coordinates.len(), 1);
        assert!(presence["u2"].route_coordinates.is_empty());
    }

    #[test]
    fn test_presence_json_round_trip() {
        let json = r#"{"u1":{"location":{"latitude":1.0,"longitude":2.0}}}"#;
        let presence = presence_from_json(json).unwrap();
        let rendered = presence_to_json(&presence).unwrap();
        assert_eq!(presence_from_json(&rendered).unwrap(), presence);
    }

    #[test]
    fn test_presence_from_json_malformed() {
        assert!(presence_from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_presence_from_json_rejects_out_of_range() {
        let json = r#"{"u1":{"location":{"latitude":500.0,"longitude":-999.0}}}"#;
        let err = presence_from_json(json).unwrap_err();
        assert!(matches!(err, crate::Error::Json(_)));
    }

    #[tokio::test]
    async fn test_import_presence() {
        let json = r#"{
            "u1": {
                "location": { "latitude": 10.0, "longitude": 106.01 },
                "routeCoordinates": {
                    "b": { "latitude": 10.0, "longitude": 106.01 },
                    "a": { "latitude": 10.0, "longitude": 106.0 }
                }
            },
            "u2": { "location": { "latitude": 3.0, "longitude": 4.0 } }
        }"#;
        let presence = presence_from_json(json).unwrap();
        let store = MemoryStore::new();

        let points = import_presence(&store, &presence).await.unwrap();

        assert_eq!(points, 2);
        let tree = store.read_all().await.unwrap();
        let route: Vec<_> = tree["u1"].route_coordinates.values().copied().collect();
        assert_eq!(
            route,
            vec![
                Coordinate::new(10.0, 106.0).unwrap(),
                Coordinate::new(10.0, 106.01).unwrap()
            ]
        );
        assert_eq!(tree["u2"].location, Some(Coordinate::new(3.0, 4.0).unwrap()));
        assert!(tree["u2"].route_coordinates.is_empty());
    }

    #[tokio::test]
    async fn test_import_into_offline_store_fails() {
        let presence =
            presence_from_json(r#"{"u1":{"location":{"latitude":1.0,"longitude":2.0}}}"#).unwrap();
        let store = MemoryStore::new();
        store.set_online(false);
        assert!(import_presence(&store, &presence).await.is_err());
    }

    #[tokio::test]
    async fn test_open_configured_memory() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = open_configured(&config, Path::new(":memory:")).unwrap();
        assert_eq!(store.name(), "memory");
    }
}
