//! Detects the course and speed jitter of a receiver that is not really
//! moving, and dense clusters of such jitter.

use tracing::debug;

use crate::geo;
use crate::kinematics;
use crate::model::{Break, BreakReason, GeoPoint, Segment, TrackPoint};
use crate::settings::AnalyzerSettings;

pub fn detect(segments: &[Segment], settings: &AnalyzerSettings) -> Vec<Break> {
    let mut breaks = Vec::new();
    for segment in segments {
        let mut points = thin(segment.points(), settings.jumping_min_meters);
        kinematics::populate(&mut points, settings);

        let mut course_jumps = Vec::new();
        for index in 1..points.len().saturating_sub(1) {
            let previous = &points[index - 1];
            let current = &points[index];
            let turn = geo::bearing_delta(previous.derived.course, current.derived.course);
            if turn.abs() >= settings.jumping_course_degrees {
                course_jumps.push(point_break(current, BreakReason::JumpingCourse));
            }
            if (current.derived.kmh - previous.derived.kmh).abs() >= settings.jumping_speed_kmh {
                breaks.push(point_break(current, BreakReason::JumpingSpeed));
            }
        }
        breaks.extend(dense_course_jumps(&course_jumps, settings));
        breaks.extend(course_jumps);
    }
    debug!(breaks = breaks.len(), "detected jumping");
    breaks
}

/// Keeps only points at least `min_meters` from the last kept one.
fn thin(points: &[TrackPoint], min_meters: f64) -> Vec<TrackPoint> {
    let mut kept: Vec<TrackPoint> = Vec::with_capacity(points.len());
    for point in points {
        let far_enough = kept
            .last()
            .map_or(true, |last| last.meters_to(point) >= min_meters);
        if far_enough {
            kept.push(point.clone());
        }
    }
    kept
}

fn point_break(point: &TrackPoint, reason: BreakReason) -> Break {
    Break::new(point.position(), point.position(), reason)
        .with_totals(point.derived.seconds, point.derived.meters)
}

/// Runs of course jumps that each have many close neighbours become a
/// single `HighDensityJumpingCourse` break.
pub fn dense_course_jumps(jumps: &[Break], settings: &AnalyzerSettings) -> Vec<Break> {
    let mut dense_runs = Vec::new();
    let mut run: Option<(usize, usize)> = None;
    let mut sparse = 0;

    for index in 0..jumps.len() {
        if is_dense(jumps, index, settings) {
            run = Some(run.map_or((index, index), |(first, _)| (first, index)));
            sparse = 0;
            continue;
        }
        if run.is_some() {
            sparse += 1;
            if sparse > settings.high_density_max_sparse {
                close_run(jumps, run.take(), settings, &mut dense_runs);
                sparse = 0;
            }
        }
    }
    close_run(jumps, run, settings, &mut dense_runs);
    dense_runs
}

fn close_run(
    jumps: &[Break],
    run: Option<(usize, usize)>,
    settings: &AnalyzerSettings,
    out: &mut Vec<Break>,
) {
    if let Some((first, last)) = run {
        if last - first + 1 > settings.high_density_min_jumps {
            out.push(Break::new(
                jumps[first].start,
                jumps[last].end,
                BreakReason::HighDensityJumpingCourse,
            ));
        }
    }
}

fn is_dense(jumps: &[Break], index: usize, settings: &AnalyzerSettings) -> bool {
    let anchor = &jumps[index].start;
    let near = |other: &Break| {
        anchor.seconds_to(&other.start).abs() <= settings.high_density_max_seconds
            && anchor.meters_to(&other.start) <= settings.high_density_max_meters
    };
    let before = jumps[..index].iter().rev().take_while(|j| near(j)).count();
    let after = jumps[index + 1..].iter().take_while(|j| near(j)).count();
    before.max(after) >= settings.high_density_min_neighbors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at_seconds, TrackBuilder};

    fn zigzag(turns: u32) -> TrackBuilder {
        let mut builder = TrackBuilder::new(47.6, -122.3).leg(5, 1.2, 0.0);
        for i in 0..turns {
            let bearing = if i % 2 == 0 { 90.0 } else { 270.0 };
            builder = builder.leg(1, 3.0, bearing);
        }
        builder.leg(5, 1.2, 0.0)
    }

    #[test]
    fn straight_walk_has_no_jumps() {
        let settings = AnalyzerSettings::default();
        let segment = TrackBuilder::new(47.6, -122.3)
            .leg(60, 1.4, 30.0)
            .segment(&settings);
        assert!(detect(&[segment], &settings).is_empty());
    }

    #[test]
    fn reversals_are_course_jumps() {
        let settings = AnalyzerSettings::default();
        let segment = zigzag(4).segment(&settings);
        let breaks = detect(&[segment], &settings);
        let course: Vec<_> = breaks
            .iter()
            .filter(|b| b.reason == BreakReason::JumpingCourse)
            .collect();
        assert!(course.len() >= 4, "{}", course.len());
        assert!(course.iter().all(|b| b.start == b.end));
        assert!(!breaks
            .iter()
            .any(|b| b.reason == BreakReason::HighDensityJumpingCourse));
    }

    #[test]
    fn speed_step_is_a_speed_jump() {
        let settings = AnalyzerSettings::default();
        let segment = TrackBuilder::new(47.6, -122.3)
            .leg(10, 1.5, 0.0)
            .leg(10, 5.0, 0.0)
            .segment(&settings);
        let breaks = detect(&[segment], &settings);
        let speed: Vec<_> = breaks
            .iter()
            .filter(|b| b.reason == BreakReason::JumpingSpeed)
            .collect();
        assert_eq!(speed.len(), 1);
        assert_eq!(speed[0].start.time, at_seconds(10.0));
    }

    #[test]
    fn sustained_jitter_is_high_density() {
        let settings = AnalyzerSettings::default();
        let segment = zigzag(30).segment(&settings);
        let breaks = detect(&[segment], &settings);
        let dense: Vec<_> = breaks
            .iter()
            .filter(|b| b.reason == BreakReason::HighDensityJumpingCourse)
            .collect();
        assert_eq!(dense.len(), 1);
        assert!(dense[0].duration_seconds() > 10.0);
    }

    #[test]
    fn thinning_skips_tiny_steps() {
        let settings = AnalyzerSettings::default();
        let points = TrackBuilder::new(47.6, -122.3)
            .leg(5, 0.3, 0.0)
            .leg(5, 2.0, 0.0)
            .track_points(&settings);
        let kept = thin(&points, 1.0);
        assert!(kept.len() < points.len());
        assert!(kept.windows(2).all(|w| w[0].meters_to(&w[1]) >= 1.0));
    }
}
