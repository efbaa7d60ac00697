//! Working state shared by the pipeline stages, and the final result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{RawPoint, TrackInput};
use crate::geo::Bounds;
use crate::kinematics;
use crate::model::{
    Break, LowQualityRun, MovementItem, Segment, Stop, TrackPoint, TransportationType, Vector,
    Waypoint,
};
use crate::names::{LocationNames, TimezoneInfo};
use crate::settings::AnalyzerSettings;
use crate::TrackError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Everything the stages read and write. Each stage takes the workspace by
/// value and hands it on, so only one stage ever holds it.
#[derive(Clone, Debug, Default)]
pub struct Workspace {
    /// Segments exactly as loaded, with kinematics.
    pub all_segments: Vec<Segment>,
    pub track_names: Vec<Option<String>>,
    pub track_bounds: Vec<TrackBounds>,
    pub current_segments: Vec<Segment>,
    pub breaks: Vec<Break>,
    pub low_quality_runs: Vec<LowQualityRun>,
    pub stops: Vec<Stop>,
    pub vectors: Vec<Vector>,
    pub input_waypoints: Vec<Waypoint>,
}

impl Workspace {
    /// Validates every point, computes kinematics and records where each
    /// input track starts and ends.
    pub fn create(input: TrackInput, settings: &AnalyzerSettings) -> Result<Self, TrackError> {
        let mut workspace = Workspace {
            input_waypoints: input.waypoints,
            ..Workspace::default()
        };
        for (track_index, track) in input.tracks.into_iter().enumerate() {
            let mut bounds: Option<TrackBounds> = None;
            for (segment_index, raw_points) in track.segments.into_iter().enumerate() {
                let mut points = Vec::with_capacity(raw_points.len());
                for (index, raw) in raw_points.into_iter().enumerate() {
                    let point = validate(raw).map_err(|reason| TrackError::InvalidPoint {
                        track: track_index,
                        segment: segment_index,
                        index,
                        reason,
                    })?;
                    points.push(point);
                }
                if points.is_empty() {
                    continue;
                }
                points.sort_by_key(|p| p.time);
                kinematics::populate(&mut points, settings);
                let segment = Segment::new(points)?;
                let (start, end) = (segment.start().time, segment.end().time);
                bounds = Some(match bounds {
                    Some(b) => TrackBounds {
                        start: b.start.min(start),
                        end: b.end.max(end),
                    },
                    None => TrackBounds { start, end },
                });
                workspace.all_segments.push(segment);
            }
            if let Some(bounds) = bounds {
                workspace.track_bounds.push(bounds);
                workspace.track_names.push(track.name);
            }
        }
        workspace.current_segments = workspace.all_segments.clone();
        workspace
            .input_waypoints
            .sort_by_key(|w| w.time);
        Ok(workspace)
    }

    pub fn point_count(&self) -> usize {
        self.current_segments.iter().map(Segment::len).sum()
    }
}

fn validate(raw: RawPoint) -> Result<TrackPoint, String> {
    let Some(time) = raw.time else {
        return Err("missing timestamp".to_string());
    };
    if !raw.latitude.is_finite() || !(-90.0..=90.0).contains(&raw.latitude) {
        return Err(format!("latitude {} out of range", raw.latitude));
    }
    if !raw.longitude.is_finite() || !(-180.0..=180.0).contains(&raw.longitude) {
        return Err(format!("longitude {} out of range", raw.longitude));
    }
    let mut point = TrackPoint::new(raw.latitude, raw.longitude, time);
    point.elevation = raw.elevation;
    point.device_speed = raw.speed;
    point.device_course = raw.course;
    point.fix = raw.fix;
    point.hdop = raw.hdop;
    point.vdop = raw.vdop;
    point.pdop = raw.pdop;
    Ok(point)
}

/// A segment with its summary values, as published in the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSegment {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub seconds: f64,
    pub kilometers: f64,
    pub speed_kmh: f64,
    pub course: i32,
    pub bounds: Bounds,
    pub transportation: Vec<TransportationType>,
    pub points: Vec<TrackPoint>,
}

impl From<Segment> for ProcessedSegment {
    fn from(segment: Segment) -> Self {
        let start_time = segment.start().time;
        let end_time = segment.end().time;
        Self {
            start_time,
            end_time,
            seconds: segment.seconds(),
            kilometers: segment.kilometers(),
            speed_kmh: segment.speed_kmh(),
            course: segment.course(),
            bounds: segment.bounds(),
            transportation: segment.transportation(),
            points: segment.into_points(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTrackGroup {
    pub name: Option<String>,
    pub segments: Vec<ProcessedSegment>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTrack {
    pub tracks: Vec<ProcessedTrackGroup>,
    pub waypoints: Vec<Waypoint>,
    pub breaks: Vec<Break>,
    pub low_quality_runs: Vec<LowQualityRun>,
    pub vectors: Vec<Vector>,
    pub movement: Vec<MovementItem>,
    pub names: LocationNames,
    pub timezone: Option<TimezoneInfo>,
    pub settings_fingerprint: String,
}

/// Groups segments back into the input tracks they came from, dropping
/// segments shorter than `min_segment_seconds`.
pub fn group_into_tracks(
    segments: Vec<Segment>,
    bounds: &[TrackBounds],
    names: &[Option<String>],
    settings: &AnalyzerSettings,
) -> Vec<ProcessedTrackGroup> {
    let mut groups: Vec<ProcessedTrackGroup> = Vec::new();
    let mut group_index: Option<usize> = None;
    let mut track_index = 0;

    for segment in segments {
        if segment.seconds() < settings.min_segment_seconds {
            continue;
        }
        while track_index + 1 < bounds.len() && segment.start().time > bounds[track_index].end {
            track_index += 1;
        }
        if group_index != Some(track_index) {
            groups.push(ProcessedTrackGroup {
                name: names.get(track_index).cloned().flatten(),
                segments: Vec::new(),
            });
            group_index = Some(track_index);
        }
        if let Some(group) = groups.last_mut() {
            group.segments.push(segment.into());
        }
    }
    groups
}
