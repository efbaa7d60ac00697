//! Low-quality runs: stretches where the recorded data is unlikely to be
//! real travel. Speed-based runs also produce `LowMovement` breaks.

use tracing::debug;

use crate::model::{Break, BreakReason, GeoPoint, LowQualityRun, LowQualityType, Segment, TrackPoint};
use crate::settings::AnalyzerSettings;

#[derive(Debug, Default)]
pub struct LowQualityReport {
    pub runs: Vec<LowQualityRun>,
    pub breaks: Vec<Break>,
}

pub fn detect(segments: &[Segment], settings: &AnalyzerSettings) -> LowQualityReport {
    let movement = detect_low_movement(segments, settings);
    let breaks = movement
        .iter()
        .map(|run| Break::new(run.start, run.end, BreakReason::LowMovement))
        .collect();

    let mut runs = movement;
    runs.extend(detect_speed_changes(segments, settings));
    runs.extend(detect_missing_data(segments, settings));
    runs.sort_by(|a, b| a.start.time.cmp(&b.start.time));

    debug!(runs = runs.len(), "detected low-quality runs");
    LowQualityReport { runs, breaks }
}

/// Runs of points at or below walking-shuffle speed. Consecutive runs close
/// in space and time merge, including across segment boundaries.
pub fn detect_low_movement(segments: &[Segment], settings: &AnalyzerSettings) -> Vec<LowQualityRun> {
    let mut runs: Vec<LowQualityRun> = Vec::new();
    for segment in segments {
        let points = segment.points();
        let mut first: Option<usize> = None;
        for (index, point) in points.iter().enumerate() {
            if point.derived.mps <= settings.movement_min_speed_meters_second {
                first.get_or_insert(index);
                continue;
            }
            if let Some(start) = first.take() {
                add_movement_run(&points[start..index], settings, &mut runs);
            }
        }
        if let Some(start) = first {
            add_movement_run(&points[start..], settings, &mut runs);
        }
    }
    runs
}

fn add_movement_run(points: &[TrackPoint], settings: &AnalyzerSettings, runs: &mut Vec<LowQualityRun>) {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return;
    };
    let seconds = first.seconds_to(last);
    if seconds < settings.low_movement_min_seconds {
        return;
    }
    let meters: f64 = points[..points.len() - 1]
        .iter()
        .map(|p| p.derived.meters)
        .sum();

    if let Some(previous) = runs.last_mut() {
        if should_merge(previous, first, seconds, settings) {
            let gap_meters = previous.end.meters_to(first);
            previous.end = last.position();
            previous.distance_km += (meters + gap_meters) / 1000.0;
            describe_movement(previous, settings);
            return;
        }
    }

    let mut run = LowQualityRun {
        start: first.position(),
        end: last.position(),
        kind: LowQualityType::LowMovement,
        description: String::new(),
        distance_km: meters / 1000.0,
    };
    describe_movement(&mut run, settings);
    runs.push(run);
}

fn should_merge(
    previous: &LowQualityRun,
    start: &TrackPoint,
    seconds: f64,
    settings: &AnalyzerSettings,
) -> bool {
    let gap_seconds = previous.end.seconds_to(start);
    let gap_meters = previous.end.meters_to(start);
    let long = previous.duration_seconds() >= settings.long_run_min_seconds
        || seconds > settings.long_run_min_seconds;
    if long {
        return gap_meters <= settings.long_merge_max_meters
            && gap_seconds <= settings.long_merge_max_seconds;
    }
    (gap_meters <= settings.short_merge_max_meters_by_distance
        && gap_seconds <= settings.short_merge_max_seconds_by_distance)
        || (gap_meters <= settings.short_merge_max_meters_by_time
            && gap_seconds <= settings.short_merge_max_seconds_by_time)
}

fn describe_movement(run: &mut LowQualityRun, settings: &AnalyzerSettings) {
    let seconds = run.duration_seconds();
    let kmh = run.net_kmh();
    run.kind = if kmh <= settings.zero_speed_kmh && seconds >= settings.zero_speed_min_seconds {
        LowQualityType::NoMovement
    } else {
        LowQualityType::LowMovement
    };
    run.description = format!("Low speed is {kmh:.2} km/h for {seconds:.0} seconds");
}

/// Consecutive points whose acceleration grade marks an implausible speed change.
pub fn detect_speed_changes(segments: &[Segment], settings: &AnalyzerSettings) -> Vec<LowQualityRun> {
    let mut runs = Vec::new();
    for segment in segments {
        let points = segment.points();
        let mut first: Option<usize> = None;
        for (index, point) in points.iter().enumerate() {
            if point.derived.acceleration_grade >= settings.big_speed_change_grade {
                first.get_or_insert(index);
                continue;
            }
            if let Some(start) = first.take() {
                runs.push(speed_change_run(&points[start..index]));
            }
        }
        if let Some(start) = first {
            runs.push(speed_change_run(&points[start..]));
        }
    }
    runs
}

fn speed_change_run(points: &[TrackPoint]) -> LowQualityRun {
    let first = &points[0];
    let last = &points[points.len() - 1];
    let meters: f64 = points.iter().map(|p| p.derived.meters).sum();
    LowQualityRun {
        start: first.position(),
        end: last.position(),
        kind: LowQualityType::BigSpeedChanges,
        description: format!(
            "Speed changed at {:.2} m/s², grade {:.1}",
            first.derived.acceleration, first.derived.acceleration_grade
        ),
        distance_km: meters / 1000.0,
    }
}

/// Steps too long for continuous recording but short enough to stay in a segment.
pub fn detect_missing_data(segments: &[Segment], settings: &AnalyzerSettings) -> Vec<LowQualityRun> {
    segments
        .iter()
        .flat_map(|segment| segment.points().windows(2))
        .filter(|pair| pair[0].derived.seconds > settings.missing_data_seconds)
        .map(|pair| LowQualityRun {
            start: pair[0].position(),
            end: pair[1].position(),
            kind: LowQualityType::MissingData,
            description: format!(
                "Missing data for {:.1} seconds and {:.1} meters",
                pair[0].derived.seconds, pair[0].derived.meters
            ),
            distance_km: pair[0].derived.meters / 1000.0,
        })
        .collect()
}
