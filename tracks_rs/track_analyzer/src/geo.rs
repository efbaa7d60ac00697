//! Small-scale geodesy used by every stage.
//!
//! Distances use the equirectangular approximation, which is accurate at
//! the point-to-point scales of a GPS track and much cheaper than a
//! great-circle formula. Bearings use the spherical initial-bearing formula.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.3;
const POINT_EPSILON: f64 = 0.000_001;

/// Initial bearing from the first coordinate to the second, in whole
/// degrees 0..=359 with 0 as north and 90 as east.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> i32 {
    let r_lat1 = lat1.to_radians();
    let r_lat2 = lat2.to_radians();
    let r_lon_delta = (lon2 - lon1).to_radians();

    let y = r_lon_delta.sin() * r_lat2.cos();
    let x = r_lat1.cos() * r_lat2.sin() - r_lat1.sin() * r_lat2.cos() * r_lon_delta.cos();

    (y.atan2(x).to_degrees().round() as i32 + 360) % 360
}

/// Signed minimal rotation from `from` to `to`, in -180..180.
pub fn bearing_delta(from: i32, to: i32) -> i32 {
    (to - from + 180).rem_euclid(360) - 180
}

pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r_lat1 = lat1.to_radians();
    let r_lat2 = lat2.to_radians();
    let x = (lon2 - lon1).to_radians() * ((r_lat1 + r_lat2) / 2.0).cos();
    let y = r_lat2 - r_lat1;
    (x * x + y * y).sqrt() * EARTH_RADIUS_KM * 1000.0
}

pub fn mps_to_kmh(mps: f64) -> f64 {
    mps * 3.6
}

/// Speed in km/h; zero when the elapsed time is too small to divide by.
pub fn speed_kmh(meters: f64, seconds: f64) -> f64 {
    if seconds.abs() <= 0.001 {
        return 0.0;
    }
    mps_to_kmh(meters / seconds)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn around(lat: f64, lon: f64) -> Self {
        Self {
            min_lat: lat,
            min_lon: lon,
            max_lat: lat,
            max_lon: lon,
        }
    }

    pub fn extend(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lat = self.max_lat.max(lat);
        self.max_lon = self.max_lon.max(lon);
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }
}

/// A planar (lat, lon) pair used by the line-crossing test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// True when the two line segments touch or cross: their bounding boxes
/// intersect and each segment straddles (or touches) the other's line.
pub fn lines_cross(a: (LatLon, LatLon), b: (LatLon, LatLon)) -> bool {
    let mut a_box = Bounds::around(a.0.lat, a.0.lon);
    a_box.extend(a.1.lat, a.1.lon);
    let mut b_box = Bounds::around(b.0.lat, b.0.lon);
    b_box.extend(b.1.lat, b.1.lon);

    a_box.intersects(&b_box) && touches_or_crosses(a, b) && touches_or_crosses(b, a)
}

fn touches_or_crosses(line: (LatLon, LatLon), other: (LatLon, LatLon)) -> bool {
    let start = side_of(line, other.0);
    let end = side_of(line, other.1);
    start.abs() < POINT_EPSILON || end.abs() < POINT_EPSILON || (start < 0.0) != (end < 0.0)
}

// Cross product of the line direction and the point, with the line moved to the origin.
fn side_of(line: (LatLon, LatLon), point: LatLon) -> f64 {
    let dir_lat = line.1.lat - line.0.lat;
    let dir_lon = line.1.lon - line.0.lon;
    let p_lat = point.lat - line.0.lat;
    let p_lon = point.lon - line.0.lon;
    dir_lat * p_lon - p_lat * dir_lon
}
