//! Splits segments wherever the device stopped recording for too long.

use tracing::debug;

use crate::kinematics;
use crate::model::{Break, BreakReason, GeoPoint, Segment, TrackPoint};
use crate::settings::AnalyzerSettings;
use crate::TrackError;

#[derive(Debug, Default)]
pub struct GapSplit {
    pub segments: Vec<Segment>,
    pub breaks: Vec<Break>,
}

/// Cuts every segment after any point whose step exceeds
/// `max_seconds_between_points`, recording a `LargeGap` break across each cut.
pub fn split_segments(
    segments: Vec<Segment>,
    settings: &AnalyzerSettings,
) -> Result<GapSplit, TrackError> {
    let mut result = GapSplit::default();
    for segment in segments {
        split_one(segment.into_points(), settings, &mut result)?;
    }
    debug!(
        segments = result.segments.len(),
        gaps = result.breaks.len(),
        "split on large gaps"
    );
    Ok(result)
}

fn split_one(
    points: Vec<TrackPoint>,
    settings: &AnalyzerSettings,
    result: &mut GapSplit,
) -> Result<(), TrackError> {
    let mut current: Vec<TrackPoint> = Vec::new();
    let mut iter = points.into_iter().peekable();
    while let Some(point) = iter.next() {
        let gap = point.derived.seconds > settings.max_seconds_between_points;
        let before = point.position();
        current.push(point);
        if !gap {
            continue;
        }
        if let Some(next) = iter.peek() {
            result
                .breaks
                .push(Break::new(before, next.position(), BreakReason::LargeGap));
            result
                .segments
                .push(finish(std::mem::take(&mut current), settings)?);
        }
    }
    if !current.is_empty() {
        result.segments.push(finish(current, settings)?);
    }
    Ok(())
}

fn finish(mut points: Vec<TrackPoint>, settings: &AnalyzerSettings) -> Result<Segment, TrackError> {
    kinematics::populate(&mut points, settings);
    Segment::new(points)
}

/// Short recording hiccups inside a segment, one break per affected step.
pub fn small_gaps(segment: &Segment, settings: &AnalyzerSettings) -> Vec<Break> {
    segment
        .points()
        .windows(2)
        .filter(|pair| pair[0].derived.seconds > settings.small_gap_seconds)
        .map(|pair| Break::new(pair[0].position(), pair[1].position(), BreakReason::SmallGap))
        .collect()
}
