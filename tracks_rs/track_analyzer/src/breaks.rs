//! Merges the breaks found by earlier stages and turns the significant ones
//! into stop candidates.

use std::cmp::Ordering;

use tracing::debug;

use crate::model::{Break, BreakReason, GeoPoint, Stop, StopReason};
use crate::settings::AnalyzerSettings;

#[derive(Debug, Default)]
pub struct Consolidation {
    pub breaks: Vec<Break>,
    pub stops: Vec<Stop>,
}

pub fn consolidate(breaks: Vec<Break>, settings: &AnalyzerSettings) -> Consolidation {
    let breaks = merge_breaks(breaks, settings);
    let stops = stops_from_breaks(&breaks, settings);
    debug!(breaks = breaks.len(), stops = stops.len(), "consolidated breaks");
    Consolidation { breaks, stops }
}

/// Sorts, joins same-reason neighbours and resolves overlaps until nothing
/// changes, so the result is a fixed point.
pub fn merge_breaks(breaks: Vec<Break>, settings: &AnalyzerSettings) -> Vec<Break> {
    let mut current = breaks;
    loop {
        let next = resolve_overlaps(join_like(current.clone(), settings));
        if next == current {
            return current;
        }
        current = next;
    }
}

fn by_time(a: &Break, b: &Break) -> Ordering {
    a.start
        .time
        .cmp(&b.start.time)
        .then(a.end.time.cmp(&b.end.time))
}

fn join_window(reason: BreakReason, settings: &AnalyzerSettings) -> f64 {
    match reason {
        BreakReason::JumpingCourse | BreakReason::JumpingSpeed => settings.jump_merge_seconds,
        _ => settings.break_merge_seconds,
    }
}

fn join_like(mut breaks: Vec<Break>, settings: &AnalyzerSettings) -> Vec<Break> {
    breaks.sort_by(by_time);
    let mut joined: Vec<Break> = Vec::with_capacity(breaks.len());
    for brk in breaks {
        if let Some(previous) = joined.last_mut() {
            if previous.reason == brk.reason
                && previous.end.seconds_to(&brk.start) < join_window(brk.reason, settings)
            {
                if brk.end.time > previous.end.time {
                    previous.end = brk.end;
                }
                previous.total_duration_seconds =
                    sum_totals(previous.total_duration_seconds, brk.total_duration_seconds);
                previous.total_distance_meters =
                    sum_totals(previous.total_distance_meters, brk.total_distance_meters);
                continue;
            }
        }
        joined.push(brk);
    }
    joined
}

fn sum_totals(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

// Breaks sharing even an instant are reconciled. A noisy-course break
// absorbs its neighbour. Otherwise the earlier break keeps the shared span:
// a later break inside it is dropped, and the part reaching past it is kept
// as `Overlapping`.
fn resolve_overlaps(breaks: Vec<Break>) -> Vec<Break> {
    let mut resolved: Vec<Break> = Vec::with_capacity(breaks.len());
    for mut brk in breaks {
        if let Some(previous) = resolved.last_mut() {
            if previous.end.time >= brk.start.time {
                if previous.reason == BreakReason::HighDensityJumpingCourse {
                    if brk.end.time > previous.end.time {
                        previous.end = brk.end;
                    }
                    continue;
                }
                if brk.reason == BreakReason::HighDensityJumpingCourse {
                    brk.start = previous.start;
                    if previous.end.time > brk.end.time {
                        brk.end = previous.end;
                    }
                    *previous = brk;
                    continue;
                }
                if brk.end.time <= previous.end.time {
                    continue;
                }
                if previous.end.time > brk.start.time {
                    brk = Break::new(previous.end, brk.end, BreakReason::Overlapping);
                }
            }
        }
        resolved.push(brk);
    }
    resolved
}

/// Noisy clusters and long low-movement breaks become stops. So does a gap
/// the device spent without moving.
pub fn stops_from_breaks(breaks: &[Break], settings: &AnalyzerSettings) -> Vec<Stop> {
    breaks
        .iter()
        .filter_map(|brk| match brk.reason {
            BreakReason::HighDensityJumpingCourse => {
                Some(Stop::new(brk.start, brk.end, StopReason::Noise, "Noisy data"))
            }
            BreakReason::LowMovement
                if brk.duration_seconds() >= settings.dwell_break_min_seconds =>
            {
                Some(Stop::new(brk.start, brk.end, StopReason::Dwell, "Low movement"))
            }
            BreakReason::LargeGap
                if brk.distance_meters() <= settings.density_radius_meters
                    && brk.duration_seconds() >= settings.min_seconds_low_movement_for_stop =>
            {
                Some(Stop::new(brk.start, brk.end, StopReason::Gap, "No data while stationary"))
            }
            _ => None,
        })
        .collect()
}
