//! Coordinates, great-circle distance and map regions.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Shown when the manual coordinate entry is missing a component.
const MISSING_COORDINATE_MESSAGE: &str = "Please enter both latitude and longitude";

/// A point on the Earth's surface in decimal degrees.
///
/// Deserializing rejects out-of-range components.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedCoordinate")]
pub struct Coordinate {
    /// Latitude in degrees, within [-90, 90].
    pub latitude: f64,
    /// Longitude in degrees, within [-180, 180].
    pub longitude: f64,
}

/// Wire form of a [`Coordinate`] before range checks.
#[derive(Deserialize)]
struct UncheckedCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<UncheckedCoordinate> for Coordinate {
    type Error = Error;

    fn try_from(raw: UncheckedCoordinate) -> Result<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

impl Coordinate {
    /// Create a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if either component is not finite or
    /// lies outside its range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(Error::invalid_input(format!(
                "coordinate out of range: latitude {latitude}, longitude {longitude}"
            )))
        }
    }

    /// Parse user-entered latitude and longitude text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if either field is blank, is not a
    /// number, or is out of range.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self> {
        let latitude = latitude.trim();
        let longitude = longitude.trim();
        if latitude.is_empty() || longitude.is_empty() {
            return Err(Error::invalid_input(MISSING_COORDINATE_MESSAGE));
        }

        let lat: f64 = latitude
            .parse()
            .map_err(|_| Error::invalid_input(format!("latitude is not a number: {latitude}")))?;
        let lon: f64 = longitude
            .parse()
            .map_err(|_| Error::invalid_input(format!("longitude is not a number: {longitude}")))?;

        Self::new(lat, lon)
    }

    /// Check that both components are finite and in range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in meters (haversine, spherical Earth).
    #[must_use]
    pub fn haversine_distance(&self, other: &Self) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        // Rounding can push `a` fractionally above 1 for antipodal points.
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_METERS * c
    }
}

/// The visible map area: a center plus viewport deltas in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Center of the viewport.
    pub center: Coordinate,
    /// Latitude span of the viewport.
    pub latitude_delta: f64,
    /// Longitude span of the viewport.
    pub longitude_delta: f64,
}

impl Region {
    /// A region of the given spans centered on `center`.
    #[must_use]
    pub fn around(center: Coordinate, latitude_delta: f64, longitude_delta: f64) -> Self {
        Self {
            center,
            latitude_delta,
            longitude_delta,
        }
    }

    /// The same spans moved to a new center.
    #[must_use]
    pub fn recentered(&self, center: Coordinate) -> Self {
        Self { center, ..*self }
    }

    /// Whether `coordinate` falls inside the viewport.
    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        (coordinate.latitude - self.center.latitude).abs() <= self.latitude_delta / 2.0
            && (coordinate.longitude - self.center.longitude).abs() <= self.longitude_delta / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid() {
        let c = Coordinate::new(10.0, 106.0).unwrap();
        assert_eq!(c.latitude, 10.0);
        assert_eq!(c.longitude, 106.0);
    }

    #[test]
    fn test_new_bounds_inclusive() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_new_out_of_range() {
        assert!(matches!(
            Coordinate::new(90.1, 0.0),
            Err(Error::InvalidInput { .. })
        ));
        assert!(matches!(
            Coordinate::new(0.0, -180.5),
            Err(Error::InvalidInput { .. })
        ));
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let c = Coordinate::parse(" 10.5 ", "106.25\n").unwrap();
        assert_eq!(c, Coordinate::new(10.5, 106.25).unwrap());
    }

    #[test]
    fn test_parse_empty_latitude() {
        let err = Coordinate::parse("", "106.0").unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert_eq!(err.status_message(), MISSING_COORDINATE_MESSAGE);
    }

    #[test]
    fn test_parse_blank_longitude() {
        assert!(matches!(
            Coordinate::parse("10.0", "   "),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_parse_non_numeric() {
        let err = Coordinate::parse("ten", "106.0").unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn test_parse_out_of_range() {
        assert!(Coordinate::parse("91", "0").is_err());
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let c = Coordinate::new(10.84952, 106.799865).unwrap();
        assert_eq!(c.haversine_distance(&c), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // 0.01 degrees of longitude at 10N is about 1.095 km.
        let a = Coordinate::new(10.0, 106.0).unwrap();
        let b = Coordinate::new(10.0, 106.01).unwrap();
        let d = a.haversine_distance(&b);
        assert!((d - 1095.0).abs() < 5.0, "distance was {d}");
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = Coordinate::new(18.7934829, 98.9867401).unwrap();
        let b = Coordinate::new(10.84952, 106.799865).unwrap();
        let ab = a.haversine_distance(&b);
        let ba = b.haversine_distance(&a);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_antipodal_is_finite() {
        let a = Coordinate::new(0.0, 0.0).unwrap();
        let b = Coordinate::new(0.0, 180.0).unwrap();
        let d = a.haversine_distance(&b);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1.0);
    }

    #[test]
    fn test_display() {
        let c = Coordinate::new(10.5, 106.25).unwrap();
        assert_eq!(c.to_string(), "10.5,106.25");
    }

    #[test]
    fn test_coordinate_serialization() {
        let c = Coordinate::new(10.0, 106.0).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"latitude":10.0,"longitude":106.0}"#);
    }

    #[test]
    fn test_deserialize_checks_range() {
        let c: Coordinate =
            serde_json::from_str(r#"{"latitude":-90.0,"longitude":180.0}"#).unwrap();
        assert_eq!(c, Coordinate::new(-90.0, 180.0).unwrap());

        let err = serde_json::from_str::<Coordinate>(r#"{"latitude":500.0,"longitude":-999.0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(serde_json::from_str::<Coordinate>(r#"{"latitude":10.0}"#).is_err());
    }

    #[test]
    fn test_region_recentered_keeps_deltas() {
        let region = Region::around(Coordinate::new(10.0, 106.0).unwrap(), 0.009, 0.009);
        let moved = region.recentered(Coordinate::new(11.0, 107.0).unwrap());
        assert_eq!(moved.center, Coordinate::new(11.0, 107.0).unwrap());
        assert_eq!(moved.latitude_delta, 0.009);
        assert_eq!(moved.longitude_delta, 0.009);
    }

    #[test]
    fn test_region_contains() {
        let region = Region::around(Coordinate::new(10.0, 106.0).unwrap(), 0.01, 0.01);
        assert!(region.contains(&Coordinate::new(10.004, 106.004).unwrap()));
        assert!(!region.contains(&Coordinate::new(10.006, 106.0).unwrap()));
    }
}
