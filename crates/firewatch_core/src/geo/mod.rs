use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Mean Earth radius in metres (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Parse the `"lat,lon"` form used by drone telemetry and fire event feeds.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let invalid = || {
            AppError::new("GEO_POINT_INVALID", "Expected location as \"lat,lon\"")
                .with_details(format!("value={raw}"))
        };

        let (lat, lon) = raw.trim().split_once(',').ok_or_else(invalid)?;
        let latitude: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let longitude: f64 = lon.trim().parse().map_err(|_| invalid())?;

        let point = GeoPoint::new(latitude, longitude);
        if !point.is_valid() {
            return Err(AppError::new("GEO_POINT_OUT_OF_RANGE", "Coordinates out of range")
                .with_details(format!("lat={latitude}; lon={longitude}")));
        }
        Ok(point)
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_m(self, other)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Great-circle distance between two points in metres (haversine).
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Clamp: rounding can push h a hair above 1 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Point `distance_m` metres due north of `origin`. Used to build fixtures at known ranges.
pub fn offset_north(origin: &GeoPoint, distance_m: f64) -> GeoPoint {
    let delta_deg = (distance_m / EARTH_RADIUS_M).to_degrees();
    GeoPoint::new(origin.latitude + delta_deg, origin.longitude)
}
