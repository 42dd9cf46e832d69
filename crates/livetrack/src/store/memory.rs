//! In-process shared store.
//!
//! Useful for tests and for several sessions running inside one process.
//! `set_online(false)` makes every call fail as if the network were down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{
    ChangeKind, PushKeyGenerator, RawPresence, RouteKey, SharedStore, StoreEvent, CHANGE_BUFFER,
};
use crate::error::{Error, Result};
use crate::geo::Coordinate;

/// A [`SharedStore`] held in memory.
#[derive(Debug)]
pub struct MemoryStore {
    tree: Mutex<RawPresence>,
    keys: Mutex<PushKeyGenerator>,
    online: AtomicBool,
    changes: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::from_presence(RawPresence::new())
    }

    /// Create a store seeded with an existing tree.
    #[must_use]
    pub fn from_presence(presence: RawPresence) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            tree: Mutex::new(presence),
            keys: Mutex::new(PushKeyGenerator::new()),
            online: AtomicBool::new(true),
            changes,
        }
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_online(&self, online: bool) {
        debug!(online, "Memory store connectivity changed");
        self.online.store(online, Ordering::SeqCst);
    }

    /// Check whether the store is reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(Error::store_unreachable("memory store is offline"))
        }
    }

    fn tree(&self) -> MutexGuard<'_, RawPresence> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, user_id: &str, kind: ChangeKind) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.changes.send(StoreEvent::new(user_id, kind));
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set_location(&self, user_id: &str, coordinate: Coordinate) -> Result<()> {
        self.ensure_online()?;
        self.tree()
            .entry(user_id.to_string())
            .or_default()
            .location = Some(coordinate);
        trace!(user_id, %coordinate, "Location set");
        self.notify(user_id, ChangeKind::Location);
        Ok(())
    }

    async fn push_route_coordinate(
        &self,
        user_id: &str,
        coordinate: Coordinate,
    ) -> Result<RouteKey> {
        self.ensure_online()?;
        let key = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_key();
        self.tree()
            .entry(user_id.to_string())
            .or_default()
            .route_coordinates
            .insert(key.clone(), coordinate);
        trace!(user_id, %key, "Route coordinate pushed");
        self.notify(user_id, ChangeKind::RouteAppended);
        Ok(key)
    }

    async fn read_all(&self) -> Result<RawPresence> {
        self.ensure_online()?;
        Ok(self.tree().clone())
    }

    async fn remove_user(&self, user_id: &str) -> Result<bool> {
        self.ensure_online()?;
        let removed = self.tree().remove(user_id).is_some();
        if removed {
            debug!(user_id, "User presence removed");
            self.notify(user_id, ChangeKind::Removed);
        }
        Ok(removed)
    }

    fn changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes.subscribe()
    }
}
