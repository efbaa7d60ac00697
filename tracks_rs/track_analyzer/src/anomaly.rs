//! Removes points that imply physically implausible acceleration.

use tracing::debug;

use crate::kinematics;
use crate::model::{Segment, TrackPoint};
use crate::settings::AnalyzerSettings;
use crate::TrackError;

#[derive(Debug, Default)]
pub struct CleanReport {
    pub segments: Vec<Segment>,
    pub removed_points: usize,
}

pub fn remove_high_acceleration(
    segments: Vec<Segment>,
    settings: &AnalyzerSettings,
) -> Result<CleanReport, TrackError> {
    let mut report = CleanReport::default();
    for segment in segments {
        let mut points = segment.into_points();
        let removed = clean_points(&mut points, settings);
        if removed > 0 {
            kinematics::populate(&mut points, settings);
        }
        report.removed_points += removed;
        if !points.is_empty() {
            report.segments.push(Segment::new(points)?);
        }
    }
    debug!(removed = report.removed_points, "removed high-acceleration points");
    Ok(report)
}

/// Drops offending points in place and returns how many were removed.
///
/// A spike near the start of a segment usually means the receiver had not
/// settled yet, so everything up to it goes. Elsewhere the point after the
/// offending step is removed and the step is re-evaluated.
pub(crate) fn clean_points(points: &mut Vec<TrackPoint>, settings: &AnalyzerSettings) -> usize {
    let mut removed = 0;
    let mut index = 0;
    while index + 1 < points.len() {
        if points[index].derived.acceleration_grade < settings.anomaly_grade {
            index += 1;
            continue;
        }
        if index < settings.anomaly_lead_in_points {
            points.drain(..=index);
            removed += index + 1;
            index = 0;
            kinematics::refresh_after_removal(points, 0, settings);
            continue;
        }
        points.remove(index + 1);
        removed += 1;
        kinematics::refresh_after_removal(points, index, settings);
    }
    removed
}
