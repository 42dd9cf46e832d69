//! `SQLite`-backed shared store.
//!
//! Several processes on one machine share presence by opening the same
//! database file. Commits made by other connections are noticed by polling
//! `PRAGMA data_version` and announced as [`ChangeKind::External`].

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{
    ChangeKind, PushKeyGenerator, RawPresence, RouteKey, SharedStore, StoreEvent, CHANGE_BUFFER,
};
use crate::error::{Error, Result};
use crate::geo::Coordinate;

const MEMORY_PATH: &str = ":memory:";

/// Shortest accepted change poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Presence store persisted in a `SQLite` database.
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    keys: Mutex<PushKeyGenerator>,
    changes: broadcast::Sender<StoreEvent>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or
    /// the schema cannot be migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening presence database at {}", path.display());
        let mut conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
        )?;
        migrations::initialize_schema(&mut conn)?;

        info!("Presence database ready at {}", path.display());
        Ok(Self::with_connection(path, conn))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(MEMORY_PATH),
            source,
        })?;
        migrations::initialize_schema(&mut conn)?;
        Ok(Self::with_connection(PathBuf::from(MEMORY_PATH), conn))
    }

    fn with_connection(path: PathBuf, conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            path,
            conn: Mutex::new(conn),
            keys: Mutex::new(PushKeyGenerator::new()),
            changes,
        }
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, user_id: &str, kind: ChangeKind) {
        let _ = self.changes.send(StoreEvent::new(user_id, kind));
    }

    /// Counts and file size.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn();
        let users: i64 = conn.query_row(
            r"
            SELECT COUNT(*) FROM (
                SELECT user_id FROM user_locations
                UNION
                SELECT user_id FROM route_coordinates
            )
            ",
            [],
            |row| row.get(0),
        )?;
        let located_users: i64 =
            conn.query_row("SELECT COUNT(*) FROM user_locations", [], |row| row.get(0))?;
        let route_points: i64 =
            conn.query_row("SELECT COUNT(*) FROM route_coordinates", [], |row| {
                row.get(0)
            })?;
        drop(conn);

        let db_size_bytes = if self.path.as_os_str() == MEMORY_PATH {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStats {
            users,
            located_users,
            route_points,
            db_size_bytes,
        })
    }

    /// Poll for commits made through other connections.
    ///
    /// The baseline version is read before this returns, so any commit made
    /// elsewhere afterwards is announced. Intervals below
    /// [`MIN_POLL_INTERVAL`] are raised to it. The task ends on its own once
    /// the last reference to the store is dropped.
    pub fn spawn_change_poller(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let mut last_version = match self.data_version() {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("Failed to read presence database version: {}", e);
                None
            }
        };
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Presence store dropped, change poller exiting");
                    break;
                };

                match store.data_version() {
                    Ok(version) => {
                        // An unknown baseline counts as a change.
                        if last_version != Some(version) {
                            trace!(version, "External presence change detected");
                            store.notify("", ChangeKind::External);
                        }
                        last_version = Some(version);
                    }
                    Err(e) => warn!("Failed to poll presence database: {}", e),
                }
            }
        })
    }

    fn data_version(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    fn write_location(&self, user_id: &str, coordinate: Coordinate) -> Result<()> {
        self.conn().execute(
            r"
            INSERT INTO user_locations (user_id, latitude, longitude, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                updated_at = excluded.updated_at
            ",
            params![
                user_id,
                coordinate.latitude,
                coordinate.longitude,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn write_route_coordinate(&self, user_id: &str, coordinate: Coordinate) -> Result<RouteKey> {
        let key = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_key();
        self.conn().execute(
            r"
            INSERT INTO route_coordinates (user_id, push_key, latitude, longitude)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                user_id,
                key.as_str(),
                coordinate.latitude,
                coordinate.longitude
            ],
        )?;
        Ok(key)
    }

    fn load_presence(&self) -> Result<RawPresence> {
        let conn = self.conn();
        let mut presence = RawPresence::new();

        let mut stmt = conn.prepare("SELECT user_id, latitude, longitude FROM user_locations")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;
        for row in rows {
            let (user_id, latitude, longitude) = row?;
            let Some(coordinate) = stored_coordinate(&user_id, latitude, longitude) else {
                continue;
            };
            presence.entry(user_id).or_default().location = Some(coordinate);
        }

        let mut stmt = conn.prepare(
            r"
            SELECT user_id, push_key, latitude, longitude
            FROM route_coordinates ORDER BY user_id, push_key
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        for row in rows {
            let (user_id, key, latitude, longitude) = row?;
            let Some(coordinate) = stored_coordinate(&user_id, latitude, longitude) else {
                continue;
            };
            presence
                .entry(user_id)
                .or_default()
                .route_coordinates
                .insert(RouteKey::from(key), coordinate);
        }

        Ok(presence)
    }

    fn delete_user(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let locations = tx.execute("DELETE FROM user_locations WHERE user_id = ?1", [user_id])?;
        let points = tx.execute(
            "DELETE FROM route_coordinates WHERE user_id = ?1",
            [user_id],
        )?;
        tx.commit()?;
        Ok(locations + points > 0)
    }
}

/// Validate a stored coordinate, dropping rows another writer got wrong.
fn stored_coordinate(user_id: &str, latitude: f64, longitude: f64) -> Option<Coordinate> {
    match Coordinate::new(latitude, longitude) {
        Ok(coordinate) => Some(coordinate),
        Err(e) => {
            warn!(user_id, error = %e, "Skipping invalid stored coordinate");
            None
        }
    }
}

/// Report any database failure as the store being unreachable.
fn unreachable(err: Error) -> Error {
    match err {
        Error::StoreUnreachable { .. } => err,
        other => Error::store_unreachable(other.to_string()),
    }
}

#[async_trait]
impl SharedStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn set_location(&self, user_id: &str, coordinate: Coordinate) -> Result<()> {
        self.write_location(user_id, coordinate)
            .map_err(unreachable)?;
        self.notify(user_id, ChangeKind::Location);
        Ok(())
    }

    async fn push_route_coordinate(
        &self,
        user_id: &str,
        coordinate: Coordinate,
    ) -> Result<RouteKey> {
        let key = self
            .write_route_coordinate(user_id, coordinate)
            .map_err(unreachable)?;
        self.notify(user_id, ChangeKind::RouteAppended);
        Ok(key)
    }

    async fn read_all(&self) -> Result<RawPresence> {
        self.load_presence().map_err(unreachable)
    }

    async fn remove_user(&self, user_id: &str) -> Result<bool> {
        let removed = self.delete_user(user_id).map_err(unreachable)?;
        if removed {
            info!(user_id, "Removed user presence");
            self.notify(user_id, ChangeKind::Removed);
        }
        Ok(removed)
    }

    fn changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes.subscribe()
    }
}

/// Statistics about the presence database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Users with a location or any route points.
    pub users: i64,
    /// Users with a current location.
    pub located_users: i64,
    /// Route points across all users.
    pub route_points: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn temp_db(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "livetrack_test_{}_{name}.db",
            std::process::id()
        ))
    }

    fn remove_db(path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }

    #[tokio::test]
    async fn test_set_and_read_location() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_location("u1", c(10.0, 106.0)).await.unwrap();
        store.set_location("u1", c(10.0, 106.01)).await.unwrap();

        let tree = store.read_all().await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree["u1"].location, Some(c(10.0, 106.01)));
    }

    #[tokio::test]
    async fn test_route_read_back_in_push_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut keys = Vec::new();
        for i in 0..50 {
            let key = store
                .push_route_coordinate("u1", c(10.0, 106.0 + f64::from(i) * 0.0001))
                .await
                .unwrap();
            keys.push(key);
        }

        let tree = store.read_all().await.unwrap();
        let route = &tree["u1"].route_coordinates;
        assert_eq!(route.len(), 50);
        assert_eq!(route.keys().cloned().collect::<Vec<_>>(), keys);
        assert!(tree["u1"].location.is_none());
    }

    #[tokio::test]
    async fn test_remove_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_location("u1", c(1.0, 1.0)).await.unwrap();
        store.push_route_coordinate("u1", c(1.0, 1.0)).await.unwrap();
        store.set_location("u2", c(2.0, 2.0)).await.unwrap();

        assert!(store.remove_user("u1").await.unwrap());
        assert!(!store.remove_user("u1").await.unwrap());

        let tree = store.read_all().await.unwrap();
        assert!(!tree.contains_key("u1"));
        assert!(tree.contains_key("u2"));
    }

    #[tokio::test]
    async fn test_own_writes_are_broadcast() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut changes = store.changes();
        store.set_location("u1", c(1.0, 1.0)).await.unwrap();
        let event = changes.recv().await.unwrap();
        assert_eq!(event, StoreEvent::new("u1", ChangeKind::Location));
    }

    #[tokio::test]
    async fn test_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_location("u1", c(1.0, 1.0)).await.unwrap();
        store.push_route_coordinate("u1", c(1.0, 1.0)).await.unwrap();
        store.push_route_coordinate("u2", c(2.0, 2.0)).await.unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.located_users, 1);
        assert_eq!(stats.route_points, 2);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let path = temp_db("reopen");
        remove_db(&path);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.set_location("u1", c(10.0, 106.0)).await.unwrap();
            store.push_route_coordinate("u1", c(10.0, 106.0)).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let tree = store.read_all().await.unwrap();
        assert_eq!(tree["u1"].location, Some(c(10.0, 106.0)));
        assert_eq!(tree["u1"].route_coordinates.len(), 1);
        assert!(store.stats().unwrap().db_size_bytes > 0);

        drop(store);
        remove_db(&path);
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!(
            "livetrack_test_nested_{}",
            std::process::id()
        ));
        let path = dir.join("a").join("presence.db");
        let _ = std::fs::remove_dir_all(&dir);

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());

        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_poller_sees_other_connection() {
        let path = temp_db("poller");
        remove_db(&path);

        let watcher = Arc::new(SqliteStore::open(&path).unwrap());
        let writer = SqliteStore::open(&path).unwrap();
        let mut changes = watcher.changes();
        let poller = watcher.spawn_change_poller(Duration::from_millis(10));

        // Let the poller record the starting version.
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.set_location("u2", c(3.0, 4.0)).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("no external change seen")
            .unwrap();
        assert_eq!(event.kind, ChangeKind::External);
        assert!(watcher.read_all().await.unwrap().contains_key("u2"));

        poller.abort();
        drop(watcher);
        drop(writer);
        remove_db(&path);
    }

    #[tokio::test]
    async fn test_poller_exits_when_store_dropped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let poller = store.spawn_change_poller(Duration::from_millis(5));
        drop(store);
        tokio::time::timeout(Duration::from_secs(5), poller)
            .await
            .expect("poller did not exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_poller_sees_commit_made_right_after_spawn() {
        let path = temp_db("early_commit");
        remove_db(&path);

        let watcher = Arc::new(SqliteStore::open(&path).unwrap());
        let writer = SqliteStore::open(&path).unwrap();
        let mut changes = watcher.changes();
        let poller = watcher.spawn_change_poller(Duration::from_millis(10));

        writer.set_location("u2", c(3.0, 4.0)).await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(500), changes.recv())
            .await
            .expect("commit before the first poll was missed")
            .unwrap();
        assert_eq!(event.kind, ChangeKind::External);

        poller.abort();
        drop(watcher);
        drop(writer);
        remove_db(&path);
    }

    #[tokio::test]
    async fn test_zero_poll_interval_is_clamped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let poller = store.spawn_change_poller(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!poller.is_finished());
        poller.abort();
    }

    #[tokio::test]
    async fn test_invalid_stored_coordinates_are_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_location("u1", c(10.0, 106.0)).await.unwrap();
        store.push_route_coordinate("u1", c(10.0, 106.0)).await.unwrap();
        store
            .conn()
            .execute_batch(
                r"
                INSERT INTO user_locations (user_id, latitude, longitude, updated_at)
                VALUES ('bad', 500.0, -999.0, '2024-01-01T00:00:00Z');
                INSERT INTO route_coordinates (user_id, push_key, latitude, longitude)
                VALUES ('u1', 'fffffffffffffffffff', 91.0, 0.0);
                ",
            )
            .unwrap();

        let tree = store.read_all().await.unwrap();
        assert!(!tree.contains_key("bad"));
        assert_eq!(tree["u1"].route_coordinates.len(), 1);
        assert_eq!(tree["u1"].location, Some(c(10.0, 106.0)));
    }

    #[test]
    fn test_unreachable_mapping() {
        let err = unreachable(Error::internal("boom"));
        assert!(matches!(err, Error::StoreUnreachable { .. }));
        assert!(err.to_string().contains("boom"));
    }
}
