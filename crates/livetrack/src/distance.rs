//! Cumulative great-circle distance along a single track.

use crate::geo::Coordinate;
use crate::position::PositionSample;

/// Running haversine total over consecutive samples.
///
/// The total never decreases: a repeated coordinate contributes zero and a
/// non-finite leg (which can only come from corrupt input) is ignored.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DistanceAccumulator {
    last: Option<Coordinate>,
    total_meters: f64,
}

impl DistanceAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a sample and return the cumulative distance in meters.
    pub fn on_sample(&mut self, sample: &PositionSample) -> f64 {
        self.on_coordinate(sample.coordinate)
    }

    /// Feed a coordinate and return the cumulative distance in meters.
    pub fn on_coordinate(&mut self, coordinate: Coordinate) -> f64 {
        if let Some(previous) = self.last {
            let leg = previous.haversine_distance(&coordinate);
            if leg.is_finite() && leg > 0.0 {
                self.total_meters += leg;
            }
        }
        self.last = Some(coordinate);
        self.total_meters
    }

    /// Cumulative distance in meters.
    #[must_use]
    pub fn total_meters(&self) -> f64 {
        self.total_meters
    }

    /// Cumulative distance in kilometers.
    #[must_use]
    pub fn total_kilometers(&self) -> f64 {
        self.total_meters / 1000.0
    }

    /// The last coordinate seen, if any.
    #[must_use]
    pub fn last(&self) -> Option<Coordinate> {
        self.last
    }
}
