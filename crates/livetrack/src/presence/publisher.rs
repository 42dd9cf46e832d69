//! Pushes this device's position into the shared store.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Identity;
use crate::error::Result;
use crate::geo::Coordinate;
use crate::store::{RouteKey, SharedStore};

/// What a call to [`PresencePublisher::publish`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The session is anonymous; nothing was written.
    Skipped,
    /// Both writes went through.
    Published {
        /// Key of the appended route entry.
        key: RouteKey,
    },
}

/// Writes one user's location and route history.
///
/// Each publish makes two independent writes: overwrite `location`, then
/// append to `routeCoordinates`. They are not atomic with each other, so a
/// reader can briefly see the new location without the matching route
/// entry (or, across stores that reorder, the other way round).
#[derive(Debug, Clone)]
pub struct PresencePublisher {
    store: Arc<dyn SharedStore>,
    identity: Identity,
}

impl PresencePublisher {
    /// Create a publisher writing as `identity`.
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, identity: Identity) -> Self {
        Self { store, identity }
    }

    /// The identity this publisher writes as.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Publish one sample. Call once per sample; nothing is batched.
    ///
    /// Both writes are attempted even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first store error if either write fails.
    pub async fn publish(&self, coordinate: Coordinate) -> Result<PublishOutcome> {
        let Some(user_id) = self.identity.user_id() else {
            trace!("No user id, skipping publish");
            return Ok(PublishOutcome::Skipped);
        };

        let location = self.store.set_location(user_id, coordinate).await;
        let route = self.store.push_route_coordinate(user_id, coordinate).await;

        match (location, route) {
            (Ok(()), Ok(key)) => {
                debug!(user_id, %coordinate, %key, "Published location");
                Ok(PublishOutcome::Published { key })
            }
            (Err(e), route) => {
                warn!(user_id, error = %e, route_appended = route.is_ok(), "Location write failed");
                Err(e)
            }
            (Ok(()), Err(e)) => {
                warn!(user_id, error = %e, "Route append failed");
                Err(e)
            }
        }
    }
}
