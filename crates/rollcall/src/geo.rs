//! Geographic primitives: coordinates, bounds checking and great-circle distance.
//!
//! Distances are computed with the Haversine formula on a spherical Earth.
//! The result is precise enough for geofencing at event scale (tens to
//! hundreds of meters) and is what the attendance service itself uses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A coordinate that falls outside the physical range of latitude/longitude.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude is NaN, infinite or outside [-90, 90].
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfBounds(f64),

    /// Longitude is NaN, infinite or outside [-180, 180].
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfBounds(f64),
}

/// A point on the Earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair without validating it.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite and within physical bounds.
    ///
    /// # Errors
    ///
    /// Returns the first component found out of bounds, latitude first.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !is_valid_latitude(self.latitude) {
            return Err(CoordinateError::LatitudeOutOfBounds(self.latitude));
        }
        if !is_valid_longitude(self.longitude) {
            return Err(CoordinateError::LongitudeOutOfBounds(self.longitude));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance_meters(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Latitude is finite and within [-90, 90]. NaN fails both comparisons.
#[must_use]
pub fn is_valid_latitude(latitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude)
}

/// Longitude is finite and within [-180, 180].
#[must_use]
pub fn is_valid_longitude(longitude: f64) -> bool {
    (-180.0..=180.0).contains(&longitude)
}

/// Haversine distance in meters between two points given in degrees.
#[must_use]
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());

    EARTH_RADIUS_METERS * c
}
