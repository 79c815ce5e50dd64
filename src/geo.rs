//! Geographic points and the geodesy primitives the correlator consumes.
//!
//! Range, bearing and mean-sea-level elevation come from the host through
//! [`Geodesy`]. [`SphericalEarth`] is a self-contained fallback for hosts
//! without a geoid model, and for tests.

use std::fmt;

/// A WGS84 position. Altitude is in meters, datum per the reporting unit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6} @ {:.1}m", self.latitude, self.longitude, self.altitude)
    }
}

/// Geodesic distance, bearing, and elevation lookup.
pub trait Geodesy: Send + Sync {
    /// Ground distance (m).
    fn distance(&self, from: &GeoPoint, to: &GeoPoint) -> f64;

    /// Initial bearing (degrees true, `[0, 360)`).
    fn bearing(&self, from: &GeoPoint, to: &GeoPoint) -> f64;

    /// Mean-sea-level elevation (m), or `None` if the lookup fails.
    fn msl(&self, point: &GeoPoint) -> Option<f64>;

    /// `msl(to) - msl(from)`, or 0.0 when either lookup fails.
    fn elevation_difference(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
        match (self.msl(from), self.msl(to)) {
            (Some(a), Some(b)) => b - a,
            _ => {
                log::warn!("elevation lookup failed for {from} -> {to}, assuming level");
                0.0
            }
        }
    }
}

/// Mean earth radius (m).
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Haversine distance and great-circle bearing on a sphere. Treats the
/// point's own altitude as its MSL elevation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalEarth;

impl Geodesy for SphericalEarth {
    fn distance(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
        let lat1 = from.latitude.to_radians();
        let lat2 = to.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (to.longitude - from.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS * a.sqrt().atan2((1.0 - a).sqrt())
    }

    fn bearing(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
        let lat1 = from.latitude.to_radians();
        let lat2 = to.latitude.to_radians();
        let dlon = (to.longitude - from.longitude).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        y.atan2(x).to_degrees().rem_euclid(360.0)
    }

    fn msl(&self, point: &GeoPoint) -> Option<f64> {
        Some(point.altitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0, 0.0);
        let d = SphericalEarth.distance(&a, &b);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn cardinal_bearings() {
        let origin = GeoPoint::new(38.0, -77.0, 0.0);
        let north = GeoPoint::new(38.01, -77.0, 0.0);
        let east = GeoPoint::new(38.0, -76.99, 0.0);
        let south = GeoPoint::new(37.99, -77.0, 0.0);
        assert!(SphericalEarth.bearing(&origin, &north).abs() < 1e-6);
        assert!((SphericalEarth.bearing(&origin, &east) - 90.0).abs() < 0.01);
        assert!((SphericalEarth.bearing(&origin, &south) - 180.0).abs() < 1e-6);
    }

    #[test]
    fn elevation_difference_uses_msl() {
        let low = GeoPoint::new(38.0, -77.0, 10.0);
        let high = GeoPoint::new(38.0, -77.0, 13.5);
        assert_eq!(SphericalEarth.elevation_difference(&low, &high), 3.5);
    }

    struct NoGeoid;

    impl Geodesy for NoGeoid {
        fn distance(&self, _: &GeoPoint, _: &GeoPoint) -> f64 {
            0.0
        }
        fn bearing(&self, _: &GeoPoint, _: &GeoPoint) -> f64 {
            0.0
        }
        fn msl(&self, _: &GeoPoint) -> Option<f64> {
            None
        }
    }

    #[test]
    fn failed_lookup_means_level() {
        let p = GeoPoint::new(1.0, 2.0, 3.0);
        assert_eq!(NoGeoid.elevation_difference(&p, &p), 0.0);
    }
}
