//! # Geographic Utilities
//!
//! Distance and centroid computations used throughout the stay point pipeline.
//!
//! ## Overview
//!
//! | Item | Description |
//! |------|-------------|
//! | [`DistanceMetric`] | Selects the earth model used for every distance in a run |
//! | [`haversine_distance`] | Great-circle distance on a sphere |
//! | [`geodesic_distance`] | Geodesic distance on the WGS84 ellipsoid |
//! | [`polyline_length`] | Total length of a sequence of points in meters |
//! | [`compute_center`] | Arithmetic mean of latitudes and longitudes |
//! | [`max_distance_from`] | Largest distance from a coordinate to any point |
//!
//! ## Example
//!
//! ```rust
//! use staypoint_miner::{GeoPoint, geo_utils::{self, DistanceMetric}};
//! use chrono::{TimeZone, Utc};
//!
//! let t = Utc.with_ymd_and_hms(2009, 4, 22, 10, 46, 0).unwrap();
//! let a = GeoPoint::new(39.9843, 116.3186, t);
//! let b = GeoPoint::new(39.9853, 116.3186, t);
//!
//! let metric = DistanceMetric::Geodesic;
//! let dist = metric.distance(&a, &b);
//! assert!((dist - 111.0).abs() < 1.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Earth model
//!
//! Thresholds such as the 200 m stay point radius are calibrated against one
//! earth model, so a pipeline carries exactly one [`DistanceMetric`] and uses
//! it for every measurement. The default is [`DistanceMetric::Geodesic`]
//! (Karney's algorithm on WGS84), which agrees with Vincenty's formulae to well
//! under a millimeter. [`DistanceMetric::Haversine`] uses a sphere of mean
//! radius 6,371,008.8 m and is within 0.5% of the ellipsoidal result.
//!
//! ### Centroid
//!
//! Stay point centroids are the arithmetic mean of member latitudes and
//! longitudes, not a geodesic mean. Over the few hundred meters a stay point
//! spans the difference is negligible.

use std::fmt;
use std::str::FromStr;

use geo::{Distance, Geodesic, Haversine, Point};

use crate::GeoPoint;

// =============================================================================
// Distance Functions
// =============================================================================

/// Earth model used for distance measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(rename_all = "lowercase"))]
pub enum DistanceMetric {
    /// Spherical earth, haversine formula.
    Haversine,
    /// WGS84 ellipsoid, Karney's geodesic algorithm.
    #[default]
    Geodesic,
}

impl DistanceMetric {
    /// Distance in meters between two points.
    #[inline]
    pub fn distance(self, p1: &GeoPoint, p2: &GeoPoint) -> f64 {
        self.distance_between(p1.location(), p2.location())
    }

    /// Distance in meters between two `(latitude, longitude)` pairs.
    pub fn distance_between(self, from: (f64, f64), to: (f64, f64)) -> f64 {
        let point1 = Point::new(from.1, from.0);
        let point2 = Point::new(to.1, to.0);
        match self {
            DistanceMetric::Haversine => Haversine::distance(point1, point2),
            DistanceMetric::Geodesic => Geodesic::distance(point1, point2),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Haversine => write!(f, "haversine"),
            DistanceMetric::Geodesic => write!(f, "geodesic"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "haversine" => Ok(DistanceMetric::Haversine),
            "geodesic" | "wgs84" | "vincenty" => Ok(DistanceMetric::Geodesic),
            other => Err(format!("unknown distance metric '{}'", other)),
        }
    }
}

/// Great-circle distance between two points on a spherical earth, in meters.
///
/// # Example
///
/// ```rust
/// use staypoint_miner::{GeoPoint, geo_utils};
/// use chrono::{TimeZone, Utc};
///
/// let now = Utc.with_ymd_and_hms(2009, 4, 22, 10, 0, 0).unwrap();
/// let london = GeoPoint::new(51.5074, -0.1278, now);
/// let paris = GeoPoint::new(48.8566, 2.3522, now);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    DistanceMetric::Haversine.distance(p1, p2)
}

/// Geodesic distance between two points on the WGS84 ellipsoid, in meters.
#[inline]
pub fn geodesic_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    DistanceMetric::Geodesic.distance(p1, p2)
}

/// Total length of a sequence of points in meters.
///
/// Sums the distance between consecutive points. Empty or single-point
/// sequences return 0.0.
pub fn polyline_length(points: &[GeoPoint], metric: DistanceMetric) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| metric.distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Compute the centroid of a set of points as `(latitude, longitude)`.
///
/// Returns the arithmetic mean of all latitude and longitude values, or `None`
/// for empty input. Not suitable for sets crossing the antimeridian.
///
/// # Example
///
/// ```rust
/// use staypoint_miner::{GeoPoint, geo_utils};
/// use chrono::{TimeZone, Utc};
///
/// let now = Utc.with_ymd_and_hms(2009, 4, 22, 10, 0, 0).unwrap();
/// let points = vec![
///     GeoPoint::new(51.50, -0.10, now),
///     GeoPoint::new(51.52, -0.12, now),
/// ];
///
/// let (lat, lon) = geo_utils::compute_center(&points).unwrap();
/// assert!((lat - 51.51).abs() < 1e-9);
/// assert!((lon - (-0.11)).abs() < 1e-9);
/// ```
pub fn compute_center(points: &[GeoPoint]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lon: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Some((sum_lat / n, sum_lon / n))
}

/// Largest distance in meters from `center` to any of `points`.
pub fn max_distance_from(center: (f64, f64), points: &[GeoPoint], metric: DistanceMetric) -> f64 {
    points
        .iter()
        .map(|p| metric.distance_between(center, p.location()))
        .fold(0.0, f64::max)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon, Utc.with_ymd_and_hms(2008, 10, 23, 2, 53, 4).unwrap())
    }

    #[test]
    fn test_distance_same_point() {
        let p = point(39.984702, 116.318417);
        assert_eq!(haversine_distance(&p, &p), 0.0);
        assert!(geodesic_distance(&p, &p).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_value() {
        let london = point(51.5074, -0.1278);
        let paris = point(48.8566, 2.3522);
        assert!(approx_eq(haversine_distance(&london, &paris), 343_560.0, 5000.0));
    }

    #[test]
    fn test_models_agree_closely_at_short_range() {
        let a = point(39.9843, 116.3186);
        let b = point(39.9861, 116.3201);
        let h = haversine_distance(&a, &b);
        let g = geodesic_distance(&a, &b);
        assert!(h > 200.0 && h < 300.0);
        assert!((h - g).abs() / g < 0.005);
    }

    #[test]
    fn test_one_millidegree_latitude_is_about_111m() {
        let a = point(39.9843, 116.3186);
        let b = point(39.9853, 116.3186);
        assert!(approx_eq(geodesic_distance(&a, &b), 111.0, 1.0));
    }

    #[test]
    fn test_polyline_length() {
        assert_eq!(polyline_length(&[], DistanceMetric::Geodesic), 0.0);
        assert_eq!(polyline_length(&[point(1.0, 1.0)], DistanceMetric::Geodesic), 0.0);

        let track = vec![point(39.9843, 116.3186), point(39.9853, 116.3186), point(39.9863, 116.3186)];
        let length = polyline_length(&track, DistanceMetric::Geodesic);
        assert!(approx_eq(length, 222.0, 2.0));
    }

    #[test]
    fn test_compute_center() {
        let track = vec![point(0.0, 0.0), point(2.0, 2.0)];
        let (lat, lon) = compute_center(&track).unwrap();
        assert!(approx_eq(lat, 1.0, 1e-12));
        assert!(approx_eq(lon, 1.0, 1e-12));
        assert!(compute_center(&[]).is_none());
    }

    #[test]
    fn test_max_distance_from() {
        let track = vec![point(39.9843, 116.3186), point(39.9853, 116.3186)];
        let d = max_distance_from((39.9843, 116.3186), &track, DistanceMetric::Geodesic);
        assert!(approx_eq(d, 111.0, 1.0));
        assert_eq!(max_distance_from((0.0, 0.0), &[], DistanceMetric::Haversine), 0.0);
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("haversine".parse::<DistanceMetric>(), Ok(DistanceMetric::Haversine));
        assert_eq!("Geodesic".parse::<DistanceMetric>(), Ok(DistanceMetric::Geodesic));
        assert_eq!("vincenty".parse::<DistanceMetric>(), Ok(DistanceMetric::Geodesic));
        assert!("manhattan".parse::<DistanceMetric>().is_err());
        assert_eq!(DistanceMetric::default(), DistanceMetric::Geodesic);
    }
}
