//! Splits segments where travel switches between on-foot and vehicle.

use tracing::debug;

use crate::kinematics;
use crate::model::{GeoPoint, Segment, TrackPoint, TransportationMode};
use crate::settings::AnalyzerSettings;
use crate::transport;
use crate::TrackError;

pub fn split_by_foot(
    segments: Vec<Segment>,
    settings: &AnalyzerSettings,
) -> Result<Vec<Segment>, TrackError> {
    let before = segments.len();
    let mut result = Vec::with_capacity(segments.len());
    for segment in segments {
        let cuts = transition_indices(segment.points(), settings);
        if cuts.is_empty() {
            result.push(segment);
            continue;
        }
        let mut points = segment.into_points();
        // Cut from the back so earlier indices stay valid.
        let mut pieces = Vec::with_capacity(cuts.len() + 1);
        for &cut in cuts.iter().rev() {
            pieces.push(points.split_off(cut));
        }
        pieces.push(points);
        for mut piece in pieces.into_iter().rev() {
            kinematics::populate(&mut piece, settings);
            result.push(Segment::new(piece)?);
        }
    }
    debug!(before, after = result.len(), "split on foot transitions");
    Ok(result)
}

/// Indices where a new segment should begin, strictly increasing and
/// never 0.
pub fn transition_indices(points: &[TrackPoint], settings: &AnalyzerSettings) -> Vec<usize> {
    let mut cuts: Vec<usize> = Vec::new();
    let mut window_start = 0;
    let mut last_on_foot: Option<bool> = None;

    for index in 1..points.len() {
        if points[window_start].seconds_to(&points[index]) <= settings.foot_split_window_seconds {
            continue;
        }
        let on_foot = transport::is_on_foot(&transport::dominant_modes(
            &points[window_start..index],
        ));
        if let Some(previous) = last_on_foot {
            if previous != on_foot {
                let cut = first_matching(points, window_start, index, on_foot);
                if cut > 0 && cuts.last().map_or(true, |last| cut > *last) {
                    cuts.push(cut);
                }
            }
        }
        last_on_foot = Some(on_foot);
        window_start = index;
    }
    cuts
}

// First point in the window whose own top mode agrees with the window;
// the window start if none does.
fn first_matching(points: &[TrackPoint], from: usize, to: usize, on_foot: bool) -> usize {
    (from..to)
        .find(|&i| (points[i].top_mode() == Some(TransportationMode::Foot)) == on_foot)
        .unwrap_or(from)
}
