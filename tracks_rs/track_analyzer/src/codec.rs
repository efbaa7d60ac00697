//! Reading GPX and FIT files into raw, unvalidated tracks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{StopReason, Waypoint};
use crate::TrackError;

const SEMICIRCLES_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

/// A fix as read from a file. Time may be missing; validation happens when
/// the workspace is created.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub time: Option<DateTime<Utc>>,
    pub elevation: Option<f64>,
    pub speed: Option<f64>,
    pub course: Option<f64>,
    pub fix: Option<String>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub pdop: Option<f64>,
}

impl RawPoint {
    pub fn at(latitude: f64, longitude: f64, time: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            time: Some(time),
            elevation: None,
            speed: None,
            course: None,
            fix: None,
            hdop: None,
            vdop: None,
            pdop: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    pub name: Option<String>,
    pub segments: Vec<Vec<RawPoint>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackInput {
    pub tracks: Vec<RawTrack>,
    pub waypoints: Vec<Waypoint>,
}

impl TrackInput {
    pub fn point_count(&self) -> usize {
        self.tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .map(Vec::len)
            .sum()
    }
}

/// Parse FIT or GPX data using the provided format hint (extension or file name).
pub fn parse_track_input(input: &[u8], format: &str) -> Result<TrackInput, TrackError> {
    let format_lc = format.to_ascii_lowercase();
    let parsed = if format_lc.ends_with(".fit") || format_lc == "fit" {
        parse_fit(input)
    } else if format_lc.ends_with(".gpx") || format_lc == "gpx" {
        parse_gpx(input)
    } else {
        Err(TrackError::UnsupportedFormat(format.to_string()))
    }?;
    debug!(
        tracks = parsed.tracks.len(),
        points = parsed.point_count(),
        waypoints = parsed.waypoints.len(),
        "parsed {}",
        format
    );
    Ok(parsed)
}

fn parse_fit(input: &[u8]) -> Result<TrackInput, TrackError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;

    let records = from_bytes(input).map_err(|e| TrackError::FitParse(e.to_string()))?;
    let mut points = Vec::new();

    for record in records.into_iter() {
        if record.kind() != MesgNum::Record {
            continue;
        }
        let mut time: Option<DateTime<Utc>> = None;
        let mut lat: Option<f64> = None;
        let mut lon: Option<f64> = None;
        let mut point = RawPoint::default();
        for field in record.fields() {
            match field.name() {
                "timestamp" => {
                    if let fitparser::Value::Timestamp(ts) = field.value() {
                        time = Some(ts.with_timezone(&Utc));
                    }
                }
                "position_lat" => lat = fit_value_to_f64(field.value()).map(fit_degrees),
                "position_long" => lon = fit_value_to_f64(field.value()).map(fit_degrees),
                "altitude" | "enhanced_altitude" => {
                    if let Some(val) = fit_value_to_f64(field.value()) {
                        point.elevation = Some(val);
                    }
                }
                "speed" | "enhanced_speed" => {
                    if let Some(val) = fit_value_to_f64(field.value()) {
                        point.speed = Some(val);
                    }
                }
                "heading" => point.course = fit_value_to_f64(field.value()),
                _ => {}
            }
        }
        // Records without a position (sensor-only samples) carry no fix.
        if let (Some(lat), Some(lon)) = (lat, lon) {
            point.latitude = lat;
            point.longitude = lon;
            point.time = time;
            points.push(point);
        }
    }

    Ok(TrackInput {
        tracks: vec![RawTrack {
            name: None,
            segments: vec![points],
        }],
        waypoints: Vec::new(),
    })
}

// Positions usually arrive as semicircles; some decoders already convert them.
fn fit_degrees(value: f64) -> f64 {
    if value.abs() > 180.0 {
        value * SEMICIRCLES_TO_DEGREES
    } else {
        value
    }
}

fn fit_value_to_f64(value: &fitparser::Value) -> Option<f64> {
    match value {
        fitparser::Value::Float32(v) => Some(*v as f64),
        fitparser::Value::Float64(v) => Some(*v),
        fitparser::Value::SInt16(v) => Some(*v as f64),
        fitparser::Value::UInt16(v) => Some(*v as f64),
        fitparser::Value::SInt32(v) => Some(*v as f64),
        fitparser::Value::UInt32(v) => Some(*v as f64),
        fitparser::Value::SInt64(v) => Some(*v as f64),
        fitparser::Value::UInt64(v) => Some(*v as f64),
        fitparser::Value::UInt8(v) => Some(*v as f64),
        fitparser::Value::SInt8(v) => Some(*v as f64),
        fitparser::Value::Array(values) => values.iter().find_map(fit_value_to_f64),
        _ => None,
    }
}

fn parse_gpx(input: &[u8]) -> Result<TrackInput, TrackError> {
    use gpx::read;
    use std::io::Cursor;

    let mut cursor = Cursor::new(input);
    let gpx = read(&mut cursor).map_err(|e| TrackError::GpxParse(e.to_string()))?;

    let mut tracks = Vec::with_capacity(gpx.tracks.len());
    for track in gpx.tracks {
        let mut segments = Vec::with_capacity(track.segments.len());
        for segment in track.segments {
            let mut points = Vec::with_capacity(segment.points.len());
            for point in segment.points {
                let time = gpx_time(point.time)?;
                let geo = point.point();
                points.push(RawPoint {
                    latitude: geo.y(),
                    longitude: geo.x(),
                    time,
                    elevation: point.elevation,
                    speed: point.speed,
                    course: None,
                    fix: point.fix.map(|f| format!("{f:?}").to_ascii_lowercase()),
                    hdop: point.hdop,
                    vdop: point.vdop,
                    pdop: point.pdop,
                });
            }
            segments.push(points);
        }
        tracks.push(RawTrack {
            name: track.name,
            segments,
        });
    }

    let mut waypoints = Vec::with_capacity(gpx.waypoints.len());
    for point in gpx.waypoints {
        let Some(time) = gpx_time(point.time)? else {
            debug!("skipping waypoint without time");
            continue;
        };
        let geo = point.point();
        waypoints.push(Waypoint {
            latitude: geo.y(),
            longitude: geo.x(),
            time,
            name: point.name,
            description: point.description,
            elevation: point.elevation,
            reason: StopReason::Waypoint,
            span: None,
        });
    }

    Ok(TrackInput { tracks, waypoints })
}

fn gpx_time(time: Option<gpx::Time>) -> Result<Option<DateTime<Utc>>, TrackError> {
    let Some(time) = time else {
        return Ok(None);
    };
    let iso = time
        .format()
        .map_err(|e| TrackError::GpxParse(e.to_string()))?;
    let utc = DateTime::parse_from_rfc3339(&iso)
        .map_err(|e| TrackError::GpxParse(e.to_string()))?
        .with_timezone(&Utc);
    Ok(Some(utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="track-analyzer tests" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="47.6" lon="-122.3">
    <time>2024-05-04T10:00:30Z</time>
    <name>Cafe</name>
  </wpt>
  <wpt lat="47.7" lon="-122.3">
    <name>No time</name>
  </wpt>
  <trk>
    <name>Morning</name>
    <trkseg>
      <trkpt lat="47.6" lon="-122.3"><ele>10.0</ele><time>2024-05-04T10:00:00Z</time></trkpt>
      <trkpt lat="47.60001" lon="-122.3"><time>2024-05-04T10:00:01Z</time></trkpt>
      <trkpt lat="47.60002" lon="-122.3"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn reads_gpx_tracks_and_waypoints() {
        let input = parse_track_input(SAMPLE.as_bytes(), "walk.GPX").unwrap();
        assert_eq!(input.tracks.len(), 1);
        assert_eq!(input.tracks[0].name.as_deref(), Some("Morning"));
        let points = &input.tracks[0].segments[0];
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].elevation, Some(10.0));
        assert!((points[1].latitude - 47.60001).abs() < 1e-9);
        assert!(points[2].time.is_none());
        assert_eq!(input.waypoints.len(), 1);
        assert_eq!(input.waypoints[0].name.as_deref(), Some("Cafe"));
        assert_eq!(input.waypoints[0].reason, StopReason::Waypoint);
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = parse_track_input(b"", "route.kml").unwrap_err();
        assert!(matches!(err, TrackError::UnsupportedFormat(_)));
    }

    #[test]
    fn reports_malformed_files() {
        assert!(matches!(
            parse_track_input(b"<gpx", "a.gpx").unwrap_err(),
            TrackError::GpxParse(_)
        ));
        assert!(matches!(
            parse_track_input(b"not a fit file", "a.fit").unwrap_err(),
            TrackError::FitParse(_)
        ));
    }

    #[test]
    fn semicircles_are_converted() {
        assert!((fit_degrees(568_000_000.0) - 47.6095).abs() < 1e-3);
        assert_eq!(fit_degrees(47.6), 47.6);
    }
}
