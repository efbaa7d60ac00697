//! Builders for synthetic 1 Hz tracks used across the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::codec::{RawPoint, RawTrack, TrackInput};
use crate::geo::EARTH_RADIUS_KM;
use crate::kinematics;
use crate::model::{Segment, TrackPoint};
use crate::settings::AnalyzerSettings;

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap()
}

pub(crate) fn at_seconds(seconds: f64) -> DateTime<Utc> {
    base_time() + Duration::milliseconds((seconds * 1000.0).round() as i64)
}

/// Walks a cursor across the map, emitting one fix per step.
pub(crate) struct TrackBuilder {
    lat: f64,
    lon: f64,
    elapsed: f64,
    bearing: f64,
    points: Vec<RawPoint>,
}

impl TrackBuilder {
    /// Starts with a single fix at `base_time()`.
    pub fn new(lat: f64, lon: f64) -> Self {
        let mut builder = Self {
            lat,
            lon,
            elapsed: 0.0,
            bearing: 0.0,
            points: Vec::new(),
        };
        builder.emit();
        builder
    }

    /// `seconds` fixes one second apart, moving at `mps` along `bearing_deg`.
    pub fn leg(mut self, seconds: u32, mps: f64, bearing_deg: f64) -> Self {
        for _ in 0..seconds {
            self.advance(1.0, mps, bearing_deg);
        }
        if mps > 0.0 {
            self.bearing = bearing_deg;
        }
        self
    }

    /// `seconds` fixes of a receiver left lying around: it creeps along at
    /// 0.25 m/s, turning at most 6 degrees a fix, and heads back to where it
    /// started once it strays near `radius_m`. The same seed always gives the
    /// same track.
    pub fn jitter(mut self, seconds: u32, radius_m: f64, seed: u64) -> Self {
        const STEP_METERS: f64 = 0.25;
        const MAX_TURN: f64 = 6.0;
        let anchor = (self.lat, self.lon);
        let steer_beyond = (radius_m - 2.5).max(0.0);
        let mut state = seed;
        let mut heading = self.bearing;
        for _ in 0..seconds {
            let (north, east) = self.offset_from(anchor);
            let turn = if north.hypot(east) > steer_beyond {
                let home = (-east).atan2(-north).to_degrees();
                (home - heading + 540.0).rem_euclid(360.0) - 180.0
            } else {
                (next_unit(&mut state) * 2.0 - 1.0) * MAX_TURN
            };
            heading = (heading + turn.clamp(-MAX_TURN, MAX_TURN)).rem_euclid(360.0);
            self.advance(1.0, STEP_METERS, heading);
        }
        self.bearing = heading;
        self
    }

    pub fn stay(self, seconds: u32) -> Self {
        self.leg(seconds, 0.0, 0.0)
    }

    /// A single fix `seconds` after the previous one, `meters` away.
    pub fn jump(mut self, seconds: f64, meters: f64, bearing_deg: f64) -> Self {
        self.move_by(meters, bearing_deg);
        self.elapsed += seconds;
        self.emit();
        self.bearing = bearing_deg;
        self
    }

    pub fn raw_points(self) -> Vec<RawPoint> {
        self.points
    }

    pub fn track_points(self, settings: &AnalyzerSettings) -> Vec<TrackPoint> {
        let mut points: Vec<TrackPoint> = self
            .points
            .into_iter()
            .map(|raw| TrackPoint::new(raw.latitude, raw.longitude, raw.time.unwrap()))
            .collect();
        kinematics::populate(&mut points, settings);
        points
    }

    pub fn segment(self, settings: &AnalyzerSettings) -> Segment {
        Segment::new(self.track_points(settings)).unwrap()
    }

    pub fn input(self) -> TrackInput {
        TrackInput {
            tracks: vec![RawTrack {
                name: Some("synthetic".to_string()),
                segments: vec![self.points],
            }],
            waypoints: Vec::new(),
        }
    }

    fn advance(&mut self, seconds: f64, mps: f64, bearing_deg: f64) {
        self.move_by(mps * seconds, bearing_deg);
        self.elapsed += seconds;
        self.emit();
    }

    fn move_by(&mut self, meters: f64, bearing_deg: f64) {
        let radius = EARTH_RADIUS_KM * 1000.0;
        let bearing = bearing_deg.to_radians();
        let north = meters * bearing.cos();
        let east = meters * bearing.sin();
        self.lat += (north / radius).to_degrees();
        self.lon += (east / (radius * self.lat.to_radians().cos())).to_degrees();
    }

    fn offset_from(&self, (lat, lon): (f64, f64)) -> (f64, f64) {
        let radius = EARTH_RADIUS_KM * 1000.0;
        let north = (self.lat - lat).to_radians() * radius;
        let east = (self.lon - lon).to_radians() * radius * self.lat.to_radians().cos();
        (north, east)
    }

    fn emit(&mut self) {
        self.points.push(RawPoint::at(self.lat, self.lon, at_seconds(self.elapsed)));
    }
}

// 64-bit LCG (Knuth's MMIX constants), uniform in [0, 1).
fn next_unit(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    (*state >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeoPoint;

    #[test]
    fn jitter_creeps_around_its_start() {
        let settings = AnalyzerSettings::default();
        for radius_m in [3.0, 14.0] {
            let points = TrackBuilder::new(47.6, -122.3)
                .jitter(400, radius_m, 5)
                .track_points(&settings);
            assert_eq!(points.len(), 401);
            for pair in points.windows(2) {
                assert!((pair[0].meters_to(&pair[1]) - 0.25).abs() < 0.01);
            }
            assert!(points.iter().all(|p| points[0].meters_to(p) < radius_m + 2.0));
        }
    }

    #[test]
    fn jitter_is_repeatable() {
        let a = TrackBuilder::new(47.6, -122.3).jitter(50, 7.0, 9).raw_points();
        let b = TrackBuilder::new(47.6, -122.3).jitter(50, 7.0, 9).raw_points();
        let c = TrackBuilder::new(47.6, -122.3).jitter(50, 7.0, 10).raw_points();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
