//! Approximates each segment by straight directional vectors.

use crate::geo;
use crate::model::{GeoPoint, LowQualityRun, LowQualityType, Segment, TrackPoint, Vector};
use crate::settings::AnalyzerSettings;

pub fn build(segments: &[Segment], settings: &AnalyzerSettings) -> Vec<Vector> {
    segments
        .iter()
        .flat_map(|segment| build_for_points(segment.points(), settings))
        .collect()
}

pub fn build_for_points(points: &[TrackPoint], settings: &AnalyzerSettings) -> Vec<Vector> {
    merge_similar(split_on_turns(points, settings), settings.vector_merge_degrees)
}

/// First pass: start a new vector whenever the smoothed course turns away
/// from the previous point or from the vector's initial heading.
fn split_on_turns(points: &[TrackPoint], settings: &AnalyzerSettings) -> Vec<Vector> {
    let mut vectors = Vec::new();
    if points.len() < 2 {
        return vectors;
    }
    let mut start = 0;
    let mut initial_bearing: Option<i32> = None;

    for index in 1..points.len() {
        let current = &points[index];
        let previous = &points[index - 1];
        let turned_locally = geo::bearing_delta(
            previous.derived.smoothed_course,
            current.derived.smoothed_course,
        )
        .abs()
            >= settings.vector_split_degrees;
        let turned_overall = initial_bearing.map_or(false, |bearing| {
            geo::bearing_delta(bearing, current.derived.smoothed_course).abs()
                >= settings.vector_split_degrees
        });

        if turned_locally || turned_overall {
            if !points[start].same_place(current) {
                vectors.push(Vector::between(&points[start], current));
            }
            start = index;
            initial_bearing = None;
            continue;
        }
        if initial_bearing.is_none()
            && points[start].meters_to(current) >= settings.vector_min_initial_meters
        {
            initial_bearing = Some(points[start].bearing_to(current));
        }
    }

    let last = &points[points.len() - 1];
    if start != points.len() - 1 && !points[start].same_place(last) {
        vectors.push(Vector::between(&points[start], last));
    }
    vectors
}

/// Second pass: fold consecutive vectors whose bearings differ by at most
/// `max_delta` into one running from the first start to the last end.
pub fn merge_similar(vectors: Vec<Vector>, max_delta: i32) -> Vec<Vector> {
    let mut merged: Vec<Vector> = Vec::with_capacity(vectors.len());
    for vector in vectors {
        match merged.last_mut() {
            Some(previous)
                if geo::bearing_delta(previous.bearing, vector.bearing).abs() <= max_delta =>
            {
                *previous = Vector::between(&previous.start, &vector.end);
            }
            _ => merged.push(vector),
        }
    }
    merged
}

/// Sharp direction reversals between consecutive vectors.
pub fn course_changes(vectors: &[Vector], settings: &AnalyzerSettings) -> Vec<LowQualityRun> {
    vectors
        .windows(2)
        .filter_map(|pair| {
            let turn = geo::bearing_delta(pair[0].bearing, pair[1].bearing);
            if turn.abs() <= settings.vector_course_change_degrees {
                return None;
            }
            Some(LowQualityRun {
                start: pair[0].end,
                end: pair[1].start,
                kind: LowQualityType::BigCourseChanges,
                description: format!("Course changed by {} degrees", turn.abs()),
                distance_km: pair[0].end.meters_to(&pair[1].start) / 1000.0,
            })
        })
        .collect()
}
