//! Observes the whole presence tree and republishes full snapshots.
//!
//! Every change notification, from any user, triggers a rebuild from a
//! fresh read of the entire tree. A failed read keeps the previous snapshot
//! on screen; the next notification tries again.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{follow_target, Identity, PresenceUpdate, SharedSnapshot};
use crate::error::Result;
use crate::store::{SharedStore, StoreEvent};

/// Builds presence snapshots for one session.
#[derive(Debug, Clone)]
pub struct PresenceSubscriber {
    store: Arc<dyn SharedStore>,
    identity: Identity,
    follow_when_anonymous: bool,
}

impl PresenceSubscriber {
    /// Create a subscriber for `identity`. Anonymous sessions follow other
    /// users by default.
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, identity: Identity) -> Self {
        Self {
            store,
            identity,
            follow_when_anonymous: true,
        }
    }

    /// Enable or disable recentering on other users while anonymous.
    #[must_use]
    pub fn with_follow(mut self, follow_when_anonymous: bool) -> Self {
        self.follow_when_anonymous = follow_when_anonymous;
        self
    }

    /// Read the tree once and build a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnreachable`] if the store cannot be read.
    pub async fn fetch(&self) -> Result<PresenceUpdate> {
        rebuild(self.store.as_ref(), &self.identity, self.follow_when_anonymous).await
    }

    /// A pull-based stream of snapshots.
    ///
    /// The first item is the current state; every later item follows a
    /// change notification.
    #[must_use]
    pub fn snapshot_stream(&self) -> SnapshotStream {
        // Subscribe before the first read so no change can slip between them.
        let changes = self.store.changes();
        SnapshotStream {
            store: Arc::clone(&self.store),
            identity: self.identity.clone(),
            follow_when_anonymous: self.follow_when_anonymous,
            changes,
            primed: false,
        }
    }

    /// Call `on_snapshot` with every new snapshot until unsubscribed.
    ///
    /// Must be called from within a tokio runtime. Read failures are logged
    /// and skipped, so the callback only ever sees good snapshots.
    pub fn subscribe<F>(&self, mut on_snapshot: F) -> Subscription
    where
        F: FnMut(PresenceUpdate) + Send + 'static,
    {
        let active = Arc::new(Mutex::new(true));
        let gate = Arc::clone(&active);
        let mut stream = self.snapshot_stream();

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(update) => {
                        let active = gate.lock().unwrap_or_else(PoisonError::into_inner);
                        if !*active {
                            break;
                        }
                        on_snapshot(update);
                    }
                    Err(e) => warn!(error = %e, "Presence read failed, keeping last snapshot"),
                }
            }
            trace!("Presence subscription task finished");
        });

        debug!(identity = %self.identity, "Presence subscription started");
        Subscription {
            active,
            task: Some(task),
        }
    }
}

async fn rebuild(
    store: &dyn SharedStore,
    identity: &Identity,
    follow_when_anonymous: bool,
) -> Result<PresenceUpdate> {
    let raw = store.read_all().await?;
    let snapshot = SharedSnapshot::from_raw(&raw);
    let recenter = follow_target(identity, &snapshot, follow_when_anonymous);
    trace!(
        users = snapshot.len(),
        route_points = snapshot.route_points(),
        recenter = recenter.is_some(),
        "Presence snapshot rebuilt"
    );
    Ok(PresenceUpdate { snapshot, recenter })
}

/// Pull-based presence snapshots.
#[derive(Debug)]
pub struct SnapshotStream {
    store: Arc<dyn SharedStore>,
    identity: Identity,
    follow_when_anonymous: bool,
    changes: broadcast::Receiver<StoreEvent>,
    primed: bool,
}

impl SnapshotStream {
    /// Wait for the next snapshot.
    ///
    /// Notifications that piled up while the previous snapshot was being
    /// consumed are folded into one rebuild; the rebuild reads the whole
    /// tree, so nothing is lost. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Result<PresenceUpdate>> {
        if self.primed {
            match self.changes.recv().await {
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Presence notifications lagged, rebuilding");
                }
                Err(RecvError::Closed) => return None,
            }
            self.drain_pending();
        } else {
            self.primed = true;
        }

        Some(rebuild(self.store.as_ref(), &self.identity, self.follow_when_anonymous).await)
    }

    fn drain_pending(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

/// Handle for a callback registered with [`PresenceSubscriber::subscribe`].
///
/// Once [`Subscription::unsubscribe`] returns, the callback will not run
/// again. Dropping the handle unsubscribes. Do not unsubscribe from inside
/// the callback itself; that call would wait on its own delivery.
#[derive(Debug)]
pub struct Subscription {
    active: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering snapshots and release the store listener.
    ///
    /// Waits for an in-flight callback to finish. Returns `true` only for
    /// the call that actually released the listener.
    pub fn unsubscribe(&mut self) -> bool {
        let released = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, false)
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if released {
            debug!("Presence subscription released");
        }
        released
    }

    /// Check if snapshots are still being delivered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
