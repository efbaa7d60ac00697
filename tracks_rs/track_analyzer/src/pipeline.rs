//! Runs the analysis stages in order and assembles the result.

use tracing::{debug, info};

use crate::codec::TrackInput;
use crate::model::{GeoPoint, Segment, Waypoint};
use crate::names::{self, PlaceNameLookup, TimezoneLookup};
use crate::settings::AnalyzerSettings;
use crate::workspace::{self, ProcessedTrack, Workspace};
use crate::{
    anomaly, breaks, foot_split, gaps, jumping, low_quality, movement, stops, vectors, TrackError,
};

type Stage = fn(Workspace, &AnalyzerSettings) -> Result<Workspace, TrackError>;

const STAGES: [(&str, Stage); 8] = [
    ("gaps", split_gaps),
    ("low_quality", detect_low_quality),
    ("anomalies", remove_anomalies),
    ("jumping", detect_jumping),
    ("breaks", consolidate_breaks),
    ("stops", detect_stops),
    ("foot_split", split_by_foot),
    ("vectors", build_vectors),
];

/// Analyzes a single input. Optional lookups add place names and a timezone.
pub struct GpsAnalyzer<'a> {
    settings: &'a AnalyzerSettings,
    place_names: Option<&'a dyn PlaceNameLookup>,
    timezones: Option<&'a dyn TimezoneLookup>,
}

impl<'a> GpsAnalyzer<'a> {
    pub fn new(settings: &'a AnalyzerSettings) -> Self {
        Self {
            settings,
            place_names: None,
            timezones: None,
        }
    }

    pub fn with_place_names(mut self, lookup: &'a dyn PlaceNameLookup) -> Self {
        self.place_names = Some(lookup);
        self
    }

    pub fn with_timezones(mut self, lookup: &'a dyn TimezoneLookup) -> Self {
        self.timezones = Some(lookup);
        self
    }

    pub fn process(&self, input: TrackInput) -> Result<ProcessedTrack, TrackError> {
        let workspace = Workspace::create(input, self.settings)?;
        info!(
            segments = workspace.all_segments.len(),
            points = workspace.point_count(),
            "analyzing track"
        );
        let workspace = self.run_stages(workspace)?;
        Ok(self.finish(workspace))
    }

    pub fn run_stages(&self, workspace: Workspace) -> Result<Workspace, TrackError> {
        let mut workspace = workspace;
        for (name, stage) in STAGES {
            workspace = stage(workspace, self.settings)?;
            debug!(
                stage = name,
                segments = workspace.current_segments.len(),
                points = workspace.point_count(),
                breaks = workspace.breaks.len(),
                stops = workspace.stops.len(),
                "stage complete"
            );
        }
        Ok(workspace)
    }

    fn finish(&self, workspace: Workspace) -> ProcessedTrack {
        let settings = self.settings;
        let Workspace {
            current_segments,
            track_names,
            track_bounds,
            breaks,
            low_quality_runs,
            stops,
            vectors,
            input_waypoints,
            ..
        } = workspace;

        let kept: Vec<Segment> = current_segments
            .into_iter()
            .filter(|s| s.seconds() >= settings.min_segment_seconds)
            .collect();

        let stop_waypoints: Vec<Waypoint> = stops.iter().map(Waypoint::from_stop).collect();
        let mut waypoints = input_waypoints;
        waypoints.extend(stop_waypoints.iter().cloned());
        waypoints.sort_by_key(|w| w.time);
        let timeline = movement::categorize(&kept, &waypoints, settings);

        let requests =
            names::build_requests(&kept, &stop_waypoints, &low_quality_runs, &timeline, settings);
        let location_names = names::resolve_names(self.place_names, &requests);
        let first_position = kept.first().map(|s| s.start().position());
        let timezone = names::resolve_timezone(self.timezones, first_position.as_ref());

        let tracks = workspace::group_into_tracks(kept, &track_bounds, &track_names, settings);
        info!(
            tracks = tracks.len(),
            stops = stops.len(),
            breaks = breaks.len(),
            movement = timeline.len(),
            "analysis complete"
        );

        ProcessedTrack {
            tracks,
            waypoints,
            breaks,
            low_quality_runs,
            vectors,
            movement: timeline,
            names: location_names,
            timezone,
            settings_fingerprint: settings.fingerprint(),
        }
    }
}

/// Analyzes `input` with no name or timezone lookups.
pub fn analyze(input: TrackInput, settings: &AnalyzerSettings) -> Result<ProcessedTrack, TrackError> {
    GpsAnalyzer::new(settings).process(input)
}

fn split_gaps(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    let split = gaps::split_segments(ws.all_segments.clone(), settings)?;
    ws.breaks.extend(split.breaks);
    for segment in &split.segments {
        ws.breaks.extend(gaps::small_gaps(segment, settings));
    }
    ws.current_segments = split.segments;
    Ok(ws)
}

fn detect_low_quality(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    let report = low_quality::detect(&ws.current_segments, settings);
    ws.low_quality_runs.extend(report.runs);
    ws.breaks.extend(report.breaks);
    Ok(ws)
}

fn remove_anomalies(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    let report = anomaly::remove_high_acceleration(std::mem::take(&mut ws.current_segments), settings)?;
    ws.current_segments = report.segments;
    Ok(ws)
}

fn detect_jumping(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    ws.breaks.extend(jumping::detect(&ws.current_segments, settings));
    Ok(ws)
}

fn consolidate_breaks(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    let consolidated = breaks::consolidate(std::mem::take(&mut ws.breaks), settings);
    ws.breaks = consolidated.breaks;
    ws.stops.extend(consolidated.stops);
    Ok(ws)
}

fn detect_stops(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    let pre_stop_vectors = vectors::build(&ws.current_segments, settings);
    let mut runs = std::mem::take(&mut ws.low_quality_runs);
    runs.extend(vectors::course_changes(&pre_stop_vectors, settings));

    let detection = stops::detect(
        std::mem::take(&mut ws.current_segments),
        runs,
        std::mem::take(&mut ws.stops),
        &pre_stop_vectors,
        settings,
    )?;
    ws.current_segments = detection.segments;
    ws.stops = detection.stops;
    ws.low_quality_runs = detection.low_quality_runs;
    ws.low_quality_runs.sort_by_key(|r| r.start.time);
    Ok(ws)
}

fn split_by_foot(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    ws.current_segments = foot_split::split_by_foot(std::mem::take(&mut ws.current_segments), settings)?;
    Ok(ws)
}

fn build_vectors(mut ws: Workspace, settings: &AnalyzerSettings) -> Result<Workspace, TrackError> {
    ws.vectors = vectors::build(&ws.current_segments, settings);
    Ok(ws)
}
