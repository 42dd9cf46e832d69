//! Routes replayed by the simulated location service.
//!
//! A route is a non-empty list of waypoints. Playback walks the list once
//! and then holds the final waypoint forever, which is what a device
//! reports once it stops moving.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used for synthetic walks.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Errors that can occur while loading a route.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The route has no waypoints.
    #[error("route has no waypoints")]
    Empty,

    /// The route file could not be read.
    #[error("failed to read route file: {0}")]
    Io(#[from] std::io::Error),

    /// The route file is not a JSON array of waypoints.
    #[error("failed to parse route: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single point on a simulated route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Waypoint {
    /// Create a new waypoint.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The point reached by travelling `distance_meters` along `bearing_degrees`.
    #[must_use]
    pub fn destination(&self, bearing_degrees: f64, distance_meters: f64) -> Self {
        let angular = distance_meters / EARTH_RADIUS_METERS;
        let bearing = bearing_degrees.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        // Normalize longitude back into [-180, 180].
        let longitude = (lon2.to_degrees() + 540.0) % 360.0 - 180.0;
        Self::new(lat2.to_degrees(), longitude)
    }
}

/// An ordered, non-empty list of waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    waypoints: Vec<Waypoint>,
}

impl Route {
    /// Create a route from waypoints.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Empty`] if no waypoints are given.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::Empty);
        }
        Ok(Self { waypoints })
    }

    /// A route that never leaves `point`.
    #[must_use]
    pub fn stationary(point: Waypoint) -> Self {
        Self {
            waypoints: vec![point],
        }
    }

    /// A straight walk of `steps` legs of `step_meters` each from `start`.
    #[must_use]
    pub fn walk(start: Waypoint, bearing_degrees: f64, step_meters: f64, steps: usize) -> Self {
        let mut waypoints = Vec::with_capacity(steps + 1);
        let mut current = start;
        waypoints.push(current);
        for _ in 0..steps {
            current = current.destination(bearing_degrees, step_meters);
            waypoints.push(current);
        }
        Self { waypoints }
    }

    /// Parse a route from a JSON array of `{"latitude", "longitude"}` objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the array is empty.
    pub fn from_json_str(json: &str) -> Result<Self, RouteError> {
        let waypoints: Vec<Waypoint> = serde_json::from_str(json)?;
        Self::new(waypoints)
    }

    /// Load a route from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RouteError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// The waypoints in order.
    #[must_use]
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false; routes are non-empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Start playback from the first waypoint.
    #[must_use]
    pub fn player(&self) -> RoutePlayer {
        RoutePlayer {
            route: self.clone(),
            position: 0,
        }
    }
}

/// Infinite playback over a route.
#[derive(Debug, Clone)]
pub struct RoutePlayer {
    route: Route,
    position: usize,
}

impl RoutePlayer {
    /// The next waypoint. Holds the last waypoint once the route is exhausted.
    pub fn next_waypoint(&mut self) -> Waypoint {
        let last = self.route.waypoints.len() - 1;
        let waypoint = self.route.waypoints[self.position.min(last)];
        if self.position < last {
            self.position += 1;
        }
        waypoint
    }

    /// The waypoint `next_waypoint` would return, without advancing.
    #[must_use]
    pub fn peek(&self) -> Waypoint {
        let last = self.route.waypoints.len() - 1;
        self.route.waypoints[self.position.min(last)]
    }

    /// Whether playback has reached the final waypoint.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.position + 1 >= self.route.waypoints.len()
    }
}
