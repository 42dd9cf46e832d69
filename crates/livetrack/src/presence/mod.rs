//! Presence: publishing this device's position and observing everyone's.
//!
//! Identity is fixed when a publisher or subscriber is built. A session
//! without a user id still observes others but never writes.

pub mod publisher;
pub mod subscriber;

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;

use crate::geo::Coordinate;
use crate::store::{RawPresence, UserId};

pub use publisher::{PresencePublisher, PublishOutcome};
pub use subscriber::{PresenceSubscriber, SnapshotStream, Subscription};

/// Who this session publishes as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity(Option<UserId>);

impl Identity {
    /// Build an identity; absent or blank ids become anonymous.
    #[must_use]
    pub fn new(user_id: Option<&str>) -> Self {
        Self(
            user_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        )
    }

    /// An identity that publishes as `user_id`, unless it is blank.
    #[must_use]
    pub fn named(user_id: &str) -> Self {
        Self::new(Some(user_id))
    }

    /// The observe-only identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(None)
    }

    /// The user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Check whether this session only observes.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(id) => f.write_str(id),
            None => f.write_str("<anonymous>"),
        }
    }
}

/// One user's presence as rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocationRecord {
    /// Latest known position.
    pub location: Coordinate,
    /// Route history, oldest first.
    pub route_coordinates: Vec<Coordinate>,
}

/// Everyone's presence at one point in time.
///
/// Always a full replacement for the previous snapshot. Users whose
/// `location` is absent in the store are left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SharedSnapshot {
    users: BTreeMap<UserId, UserLocationRecord>,
}

impl SharedSnapshot {
    /// Build a snapshot from the raw store tree.
    ///
    /// Route entries are ordered by their push keys, which sort
    /// chronologically.
    #[must_use]
    pub fn from_raw(raw: &RawPresence) -> Self {
        let users = raw
            .iter()
            .filter_map(|(user_id, entry)| {
                let location = entry.location?;
                Some((
                    user_id.clone(),
                    UserLocationRecord {
                        location,
                        route_coordinates: entry.route_coordinates.values().copied().collect(),
                    },
                ))
            })
            .collect();
        Self { users }
    }

    /// Look up one user.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&UserLocationRecord> {
        self.users.get(user_id)
    }

    /// Users in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &UserLocationRecord)> {
        self.users.iter()
    }

    /// Number of users shown.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if nobody is shown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Total route points across all users.
    #[must_use]
    pub fn route_points(&self) -> usize {
        self.users.values().map(|r| r.route_coordinates.len()).sum()
    }
}

/// A rebuilt snapshot plus an optional request to move the viewport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceUpdate {
    /// The new snapshot.
    pub snapshot: SharedSnapshot,
    /// Where to recenter the local view, if anywhere.
    pub recenter: Option<Coordinate>,
}

/// Where an anonymous session recenters after a rebuild.
///
/// Every user in the snapshot differs from an empty local id, so each one
/// in turn claims the viewport and the last in id order wins. Named
/// sessions never follow anyone.
#[must_use]
pub fn follow_target(
    identity: &Identity,
    snapshot: &SharedSnapshot,
    follow_when_anonymous: bool,
) -> Option<Coordinate> {
    if !identity.is_anonymous() || !follow_when_anonymous {
        return None;
    }
    snapshot.iter().last().map(|(_, record)| record.location)
}
