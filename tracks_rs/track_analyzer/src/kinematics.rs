//! Per-point derived values: step course/distance/speed, acceleration and
//! its grade, Gaussian-smoothed course and speed, and transportation modes.
//!
//! Everything here is a function of a point and its neighbours in the same
//! segment, so any change to a segment's membership is followed by
//! [`populate`] on the new point list.

use crate::geo;
use crate::model::{GeoPoint, Kinematics, TrackPoint};
use crate::settings::AnalyzerSettings;
use crate::transport;

const MIN_SECONDS: f64 = 0.001;
const MAX_GRADE: f64 = 10.0;

/// (speed ceiling km/h, acceleration m/s² considered unremarkable below it)
const GRADE_BANDS: [(f64, f64); 4] = [(6.6, 1.3), (34.0, 1.25), (128.0, 2.5), (320.0, 5.0)];

/// Recomputes every derived field of `points` from scratch.
pub fn populate(points: &mut [TrackPoint], settings: &AnalyzerSettings) {
    for point in points.iter_mut() {
        point.derived = Kinematics::default();
    }
    for index in 0..points.len() {
        step(points, index, settings);
    }
    for index in 0..points.len() {
        differentials(points, index);
    }
    smooth(points, settings);
}

/// Refreshes the step from `index` and the acceleration of its neighbours
/// after the point following `index` was removed.
pub fn refresh_after_removal(points: &mut [TrackPoint], index: usize, settings: &AnalyzerSettings) {
    for i in index..points.len().min(index + 2) {
        step(points, i, settings);
    }
    for i in index.saturating_sub(1)..points.len().min(index + 2) {
        differentials(points, i);
    }
}

/// Scores an acceleration against what is plausible at the preceding speed.
/// 0 means unremarkable, larger means more anomalous, capped at 10.
pub fn acceleration_grade(previous_kmh: f64, acceleration: f64) -> f64 {
    let threshold = GRADE_BANDS
        .iter()
        .find(|(ceiling, _)| previous_kmh <= *ceiling)
        .map(|(_, limit)| *limit);
    let Some(threshold) = threshold else {
        return 0.0;
    };
    let magnitude = acceleration.abs();
    if magnitude <= threshold {
        return 0.0;
    }
    let grade = magnitude / threshold;
    if grade.is_nan() {
        0.0
    } else {
        grade.clamp(0.0, MAX_GRADE)
    }
}

fn step(points: &mut [TrackPoint], index: usize, settings: &AnalyzerSettings) {
    let derived = match points.get(index + 1) {
        Some(next) => {
            let current = &points[index];
            let meters = current.meters_to(next);
            let seconds = current.seconds_to(next);
            let mps = if seconds <= MIN_SECONDS { 0.0 } else { meters / seconds };
            (current.bearing_to(next), meters, seconds, mps)
        }
        None => (0, 0.0, 0.0, 0.0),
    };
    let (course, meters, seconds, mps) = derived;
    let kmh = geo::mps_to_kmh(mps);
    let point = &mut points[index];
    point.derived.course = course;
    point.derived.meters = meters;
    point.derived.seconds = seconds;
    point.derived.mps = mps;
    point.derived.kmh = kmh;
    point.derived.transportation = transport::classify(kmh, settings.transportation_top_modes);
}

// Needs `step` to have run for index - 1, index and index + 1.
fn differentials(points: &mut [TrackPoint], index: usize) {
    let len = points.len();
    let has_previous = index > 0;
    let has_next = index + 1 < len;

    let delta_course = if index + 2 < len {
        geo::bearing_delta(points[index].derived.course, points[index + 1].derived.course)
    } else {
        0
    };

    let (acceleration, grade) = if has_previous && has_next {
        let previous = &points[index - 1].derived;
        let current = &points[index].derived;
        let dt = (previous.seconds + current.seconds) / 2.0;
        let acceleration = if dt <= MIN_SECONDS {
            0.0
        } else {
            (current.mps - previous.mps) / dt
        };
        let acceleration = if acceleration.is_nan() { 0.0 } else { acceleration };
        (acceleration, acceleration_grade(previous.kmh, acceleration))
    } else {
        (0.0, 0.0)
    };

    let derived = &mut points[index].derived;
    derived.delta_course = delta_course;
    derived.acceleration = acceleration;
    derived.acceleration_grade = grade;
}

fn smooth(points: &mut [TrackPoint], settings: &AnalyzerSettings) {
    let len = points.len();
    if len < 2 {
        return;
    }
    // The last point has no step of its own.
    let steps = len - 1;
    let half = settings.gauss_kernel_width / 2;
    let sigma = settings.gauss_kernel_width as f64 / 2.0;

    let mut smoothed = Vec::with_capacity(steps);
    for index in 0..steps {
        let from = index.saturating_sub(half);
        let to = (index + half).min(steps - 1);
        let mut weight_total = 0.0;
        let mut kmh_total = 0.0;
        let mut sin_total = 0.0;
        let mut cos_total = 0.0;
        for other in &points[from..=to] {
            let dt = points[index].seconds_to(other);
            if dt.abs() > settings.speed_smoothing_seconds {
                continue;
            }
            let weight = (-(dt * dt) / (2.0 * sigma * sigma)).exp();
            let radians = (other.derived.course as f64).to_radians();
            weight_total += weight;
            kmh_total += weight * other.derived.kmh;
            sin_total += weight * radians.sin();
            cos_total += weight * radians.cos();
        }
        let current = &points[index].derived;
        let kmh = if weight_total > 0.0 {
            kmh_total / weight_total
        } else {
            current.kmh
        };
        let course = if sin_total.abs() < 1e-12 && cos_total.abs() < 1e-12 {
            current.course
        } else {
            (sin_total.atan2(cos_total).to_degrees().round() as i32 + 360) % 360
        };
        smoothed.push((course, kmh));
    }

    for (point, (course, kmh)) in points.iter_mut().zip(smoothed.iter()) {
        point.derived.smoothed_course = *course;
        point.derived.smoothed_kmh = *kmh;
    }
    if let Some(&(course, kmh)) = smoothed.last() {
        let last = &mut points[len - 1].derived;
        last.smoothed_course = course;
        last.smoothed_kmh = kmh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransportationMode;
    use crate::test_support::TrackBuilder;

    #[test]
    fn steady_walk_has_constant_step_values() {
        let settings = AnalyzerSettings::default();
        let points = TrackBuilder::new(47.6, -122.3)
            .leg(10, 1.5, 0.0)
            .track_points(&settings);
        assert_eq!(points.len(), 11);
        for point in &points[..10] {
            assert_eq!(point.derived.course, 0);
            assert!((point.derived.mps - 1.5).abs() < 0.01);
            assert!((point.derived.seconds - 1.0).abs() < 1e-9);
            assert_eq!(point.derived.acceleration_grade, 0.0);
            assert_eq!(point.top_mode(), Some(TransportationMode::Foot));
        }
        let last = &points[10].derived;
        assert_eq!(last.meters, 0.0);
        assert_eq!(last.kmh, 0.0);
        assert_eq!(last.acceleration, 0.0);
        assert_eq!(points[0].derived.acceleration, 0.0);
    }

    #[test]
    fn grade_bands_follow_preceding_speed() {
        assert_eq!(acceleration_grade(5.0, 1.0), 0.0);
        assert!((acceleration_grade(5.0, 2.6) - 2.0).abs() < 1e-9);
        assert!((acceleration_grade(100.0, -5.0) - 2.0).abs() < 1e-9);
        assert_eq!(acceleration_grade(400.0, 50.0), 0.0);
        assert_eq!(acceleration_grade(5.0, 1000.0), 10.0);
        assert_eq!(acceleration_grade(5.0, f64::NAN), 0.0);
    }

    #[test]
    fn sudden_jump_produces_high_grade() {
        let settings = AnalyzerSettings::default();
        let points = TrackBuilder::new(47.6, -122.3)
            .leg(5, 1.0, 90.0)
            .leg(1, 100.0, 90.0)
            .leg(5, 1.0, 90.0)
            .track_points(&settings);
        // Step 5 -> 6 is the 100 m jump.
        assert!(points[5].derived.acceleration_grade >= 6.0);
    }

    #[test]
    fn smoothing_averages_around_a_turn() {
        let settings = AnalyzerSettings::default();
        let points = TrackBuilder::new(47.6, -122.3)
            .leg(10, 2.0, 0.0)
            .leg(10, 2.0, 90.0)
            .track_points(&settings);
        let turn = &points[9].derived;
        assert!(turn.smoothed_course > 10 && turn.smoothed_course < 80, "{}", turn.smoothed_course);
        assert_eq!(points[2].derived.smoothed_course, 0);
        assert_eq!(points[20].derived.smoothed_course, points[19].derived.smoothed_course);
        assert_eq!(points[9].derived.delta_course, 90);
    }

    #[test]
    fn removal_refresh_matches_full_recompute() {
        let settings = AnalyzerSettings::default();
        let mut points = TrackBuilder::new(47.6, -122.3)
            .leg(8, 1.0, 45.0)
            .track_points(&settings);
        points.remove(4);
        refresh_after_removal(&mut points, 3, &settings);
        let mut expected = points.clone();
        populate(&mut expected, &settings);
        for (a, b) in points.iter().zip(expected.iter()) {
            assert_eq!(a.derived.meters, b.derived.meters);
            assert_eq!(a.derived.acceleration, b.derived.acceleration);
        }
    }
}
