//! Great-circle distance on a spherical Earth.

use serde::{Deserialize, Serialize};

/// Earth mean radius used by every distance computation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinate> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Rejects non-finite values and anything outside [-90, 90] x [-180, 180].
    pub fn validate(&self) -> Result<(), InvalidCoordinate> {
        let latitude_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let longitude_ok =
            self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);

        if latitude_ok && longitude_ok {
            Ok(())
        } else {
            Err(InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("invalid coordinate ({latitude}, {longitude}): latitude must be within [-90, 90] and longitude within [-180, 180]")]
pub struct InvalidCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Haversine distance in meters between two coordinates.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> Result<f64, InvalidCoordinate> {
    a.validate()?;
    b.validate()?;

    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `h` a hair past 1.0 for antipodal points.
    let central_angle = 2.0 * h.sqrt().min(1.0).asin();

    Ok(EARTH_RADIUS_METERS * central_angle)
}
