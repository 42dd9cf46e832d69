//! The local route recorded during a session.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::geo::Coordinate;

/// An immutable, cheaply cloneable view of a recorded route.
#[derive(Debug, Clone, PartialEq)]
pub struct Track(Arc<[Coordinate]>);

impl Default for Track {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl Serialize for Track {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl Track {
    /// The points as a slice.
    #[must_use]
    pub fn points(&self) -> &[Coordinate] {
        &self.0
    }
}

impl Deref for Track {
    type Target = [Coordinate];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Coordinate>> for Track {
    fn from(points: Vec<Coordinate>) -> Self {
        Self(points.into())
    }
}

/// Append-only recorder for "my" route.
///
/// Every coordinate is kept; there is no deduplication or compaction.
#[derive(Debug, Default, Clone)]
pub struct TrackRecorder {
    points: Vec<Coordinate>,
}

impl TrackRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a coordinate.
    pub fn append(&mut self, coordinate: Coordinate) {
        self.points.push(coordinate);
    }

    /// A view of everything appended so far.
    #[must_use]
    pub fn snapshot(&self) -> Track {
        Track::from(self.points.clone())
    }

    /// Number of recorded points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The most recent point.
    #[must_use]
    pub fn last(&self) -> Option<Coordinate> {
        self.points.last().copied()
    }
}
