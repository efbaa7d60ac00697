//! Stop detection: density clouds, long low-movement runs and noisy dwell
//! clusters are merged into stops, whose points are then removed from the
//! segments.

use tracing::debug;

use crate::geo::{self, LatLon};
use crate::kinematics;
use crate::model::{
    GeoPoint, LowQualityRun, LowQualityType, Segment, Stop, StopReason, TrackPoint, Vector,
};
use crate::settings::AnalyzerSettings;
use crate::TrackError;

#[derive(Debug, Default)]
pub struct StopDetection {
    pub segments: Vec<Segment>,
    pub stops: Vec<Stop>,
    pub low_quality_runs: Vec<LowQualityRun>,
}

/// `candidates` are stops already derived elsewhere (from breaks); `vectors`
/// are the pre-stop vectors used to judge whether a cluster is noisy.
pub fn detect(
    segments: Vec<Segment>,
    runs: Vec<LowQualityRun>,
    candidates: Vec<Stop>,
    vectors: &[Vector],
    settings: &AnalyzerSettings,
) -> Result<StopDetection, TrackError> {
    let mut stops = candidates;
    for segment in &segments {
        stops.extend(density_stops(segment.points(), settings));
    }
    let (runs, dwells) = cluster_dwells(runs, vectors, settings);
    stops.extend(dwells);
    stops.extend(low_movement_stops(&runs, settings));

    let stops = merge_stops(stops, settings);
    let segments = remove_points_in_stops(segments, &stops, settings)?;
    let low_quality_runs = runs
        .into_iter()
        .filter(|run| !stops.iter().any(|stop| stop.contains_run(run)))
        .collect::<Vec<_>>();

    debug!(
        stops = stops.len(),
        segments = segments.len(),
        runs = low_quality_runs.len(),
        "detected stops"
    );
    Ok(StopDetection {
        segments,
        stops,
        low_quality_runs,
    })
}

/// Number of points within `density_radius_meters` of each point, looking
/// `density_points_delta` indices either side (the point itself included).
pub fn point_density(points: &[TrackPoint], settings: &AnalyzerSettings) -> Vec<usize> {
    let delta = settings.density_points_delta;
    (0..points.len())
        .map(|index| {
            let from = index.saturating_sub(delta);
            let to = (index + delta).min(points.len() - 1);
            points[from..=to]
                .iter()
                .filter(|other| points[index].meters_to(*other) <= settings.density_radius_meters)
                .count()
        })
        .collect()
}

/// A run of dense points, tolerating short sparse interruptions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityCloud {
    pub first: usize,
    pub last: usize,
    pub dense_points: usize,
    pub seconds: f64,
}

impl DensityCloud {
    pub fn length(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn ratio(&self) -> f64 {
        self.dense_points as f64 / self.length() as f64
    }

    pub fn qualifies(&self, settings: &AnalyzerSettings) -> bool {
        self.length() > settings.density_minimum_cloud_length
            && self.seconds > settings.density_minimum_cloud_seconds
            && self.ratio() > settings.density_minimum_ratio
    }
}

pub fn density_clouds(points: &[TrackPoint], settings: &AnalyzerSettings) -> Vec<DensityCloud> {
    let density = point_density(points, settings);
    let mut clouds = Vec::new();
    let mut current: Option<DensityCloud> = None;
    let mut sparse = 0;

    for (index, count) in density.iter().enumerate() {
        if *count >= settings.density_minimum {
            let cloud = current.get_or_insert(DensityCloud {
                first: index,
                last: index,
                dense_points: 0,
                seconds: 0.0,
            });
            cloud.last = index;
            cloud.dense_points += 1;
            sparse = 0;
            continue;
        }
        if current.is_some() {
            sparse += 1;
            if sparse > settings.density_min_points_between_clouds {
                clouds.extend(current.take());
                sparse = 0;
            }
        }
    }
    clouds.extend(current);

    for cloud in clouds.iter_mut() {
        cloud.seconds = points[cloud.first].seconds_to(&points[cloud.last]);
    }
    clouds
}

fn density_stops(points: &[TrackPoint], settings: &AnalyzerSettings) -> Vec<Stop> {
    density_clouds(points, settings)
        .into_iter()
        .filter(|cloud| cloud.qualifies(settings))
        .map(|cloud| {
            Stop::new(
                points[cloud.first].position(),
                points[cloud.last].position(),
                StopReason::Stop,
                "High density",
            )
        })
        .collect()
}

fn low_movement_stops(runs: &[LowQualityRun], settings: &AnalyzerSettings) -> Vec<Stop> {
    runs.iter()
        .filter(|run| {
            run.is_movement()
                && run.duration_seconds() >= settings.min_seconds_low_movement_for_stop
        })
        .map(|run| Stop::new(run.start, run.end, StopReason::Stop, &run.description))
        .collect()
}

fn is_notable(run: &LowQualityRun) -> bool {
    matches!(
        run.kind,
        LowQualityType::NoMovement
            | LowQualityType::LowMovement
            | LowQualityType::BigSpeedChanges
            | LowQualityType::BigCourseChanges
    )
}

/// Groups runs that follow each other closely. A group with enough notable
/// runs whose vectors cross over themselves is a dwell; the runs of every
/// other group are returned untouched.
pub fn cluster_dwells(
    runs: Vec<LowQualityRun>,
    vectors: &[Vector],
    settings: &AnalyzerSettings,
) -> (Vec<LowQualityRun>, Vec<Stop>) {
    let mut runs = runs;
    runs.sort_by(|a, b| a.start.time.cmp(&b.start.time));

    let mut groups: Vec<Vec<LowQualityRun>> = Vec::new();
    let mut anchor: Option<LowQualityRun> = None;
    for run in runs {
        let linked = anchor.as_ref().map_or(false, |previous| {
            previous.midpoint().meters_to(&run.start) < settings.dwell_cluster_max_meters
                || previous.end.seconds_to(&run.start).max(0.0) < settings.dwell_cluster_max_seconds
        });
        if !linked {
            groups.push(Vec::new());
            anchor = None;
        }
        if is_notable(&run) {
            anchor = Some(run.clone());
        }
        if let Some(group) = groups.last_mut() {
            group.push(run);
        }
    }

    let mut remaining = Vec::new();
    let mut dwells = Vec::new();
    for group in groups {
        let notable = group.iter().filter(|run| is_notable(run)).count();
        let start = group.iter().map(|run| run.start).min_by_key(|p| p.time);
        let end = group.iter().map(|run| run.end).max_by_key(|p| p.time);
        if let (Some(start), Some(end)) = (start, end) {
            if notable >= settings.dwell_cluster_min_notable
                && are_vectors_noisy(vectors, start.time, end.time, settings)
            {
                dwells.push(Stop::new(start, end, StopReason::Dwell, "Noisy low movement"));
                continue;
            }
        }
        remaining.extend(group);
    }
    (remaining, dwells)
}

/// Vectors in the time range that repeatedly cross each other and turn sharply.
pub fn are_vectors_noisy(
    vectors: &[Vector],
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
    settings: &AnalyzerSettings,
) -> bool {
    let inside: Vec<&Vector> = vectors.iter().filter(|v| v.overlaps_time(from, to)).collect();
    if inside.is_empty() {
        return false;
    }
    let line = |v: &Vector| {
        (
            LatLon::new(v.start.latitude, v.start.longitude),
            LatLon::new(v.end.latitude, v.end.longitude),
        )
    };
    let mut crossings = 0;
    for i in 0..inside.len() {
        for j in i + 2..inside.len() {
            if geo::lines_cross(line(inside[i]), line(inside[j])) {
                crossings += 1;
            }
        }
    }
    let sharp_turn = inside.windows(2).any(|pair| {
        geo::bearing_delta(pair[0].bearing, pair[1].bearing).abs() > settings.sharp_turn_threshold
    });
    crossings >= inside.len() && sharp_turn
}

/// Sorts stops and merges those that overlap or are close in time. The
/// merged stop takes the reason (and description) of higher priority.
pub fn merge_stops(stops: Vec<Stop>, settings: &AnalyzerSettings) -> Vec<Stop> {
    let mut stops = stops;
    stops.sort_by(|a, b| a.start.time.cmp(&b.start.time));
    let mut merged: Vec<Stop> = Vec::with_capacity(stops.len());
    for stop in stops {
        if let Some(previous) = merged.last_mut() {
            if previous.end.seconds_to(&stop.start) < settings.min_seconds_between_stops {
                if stop.end.time > previous.end.time {
                    previous.end = stop.end;
                }
                if stop.reason.priority() > previous.reason.priority() {
                    previous.reason = stop.reason;
                    previous.description = stop.description;
                }
                continue;
            }
        }
        merged.push(stop);
    }
    merged
}

/// Drops points that fall inside any stop, splitting segments where points
/// were removed and recomputing the pieces.
pub fn remove_points_in_stops(
    segments: Vec<Segment>,
    stops: &[Stop],
    settings: &AnalyzerSettings,
) -> Result<Vec<Segment>, TrackError> {
    if stops.is_empty() {
        return Ok(segments);
    }
    let mut result = Vec::with_capacity(segments.len());
    for segment in segments {
        let touched = stops.iter().any(|stop| {
            stop.start.time <= segment.end().time && stop.end.time >= segment.start().time
        });
        if !touched {
            result.push(segment);
            continue;
        }
        let mut piece: Vec<TrackPoint> = Vec::new();
        for point in segment.into_points() {
            if stops.iter().any(|stop| stop.contains_time(point.time)) {
                if !piece.is_empty() {
                    result.push(finish(std::mem::take(&mut piece), settings)?);
                }
                continue;
            }
            piece.push(point);
        }
        if !piece.is_empty() {
            result.push(finish(piece, settings)?);
        }
    }
    Ok(result)
}

fn finish(mut points: Vec<TrackPoint>, settings: &AnalyzerSettings) -> Result<Segment, TrackError> {
    kinematics::populate(&mut points, settings);
    Segment::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::test_support::{at_seconds, TrackBuilder};

    fn settings() -> AnalyzerSettings {
        AnalyzerSettings::default()
    }

    fn cloud(length: usize, dense_points: usize, seconds: f64) -> DensityCloud {
        DensityCloud {
            first: 100,
            last: 100 + length - 1,
            dense_points,
            seconds,
        }
    }

    fn pos(seconds: f64) -> Position {
        Position {
            latitude: 47.6,
            longitude: -122.3,
            time: at_seconds(seconds),
        }
    }

    #[test]
    fn cloud_thresholds_are_strict() {
        let settings = settings();
        assert!(cloud(50, 40, 120.0).qualifies(&settings));

        assert!(!cloud(10, 10, 120.0).qualifies(&settings));
        assert!(cloud(11, 11, 120.0).qualifies(&settings));

        assert!(!cloud(50, 40, 60.0).qualifies(&settings));
        assert!(cloud(50, 40, 61.0).qualifies(&settings));

        assert!(!cloud(50, 33, 120.0).qualifies(&settings));
        assert!(cloud(50, 34, 120.0).qualifies(&settings));
    }

    #[test]
    fn stationary_minutes_form_a_cloud() {
        let settings = settings();
        let points = TrackBuilder::new(47.6, -122.3)
            .leg(60, 1.4, 0.0)
            .stay(120)
            .leg(60, 1.4, 0.0)
            .track_points(&settings);
        let clouds = density_clouds(&points, &settings);
        assert_eq!(clouds.len(), 1);
        assert!(clouds[0].qualifies(&settings));
        assert!(clouds[0].first <= 60 && clouds[0].last >= 180);
    }

    #[test]
    fn walking_never_forms_a_cloud() {
        let settings = settings();
        let points = TrackBuilder::new(47.6, -122.3)
            .leg(200, 1.4, 0.0)
            .track_points(&settings);
        assert!(density_clouds(&points, &settings).is_empty());
    }

    #[test]
    fn nearby_stops_merge_with_highest_priority() {
        let settings = settings();
        let merged = merge_stops(
            vec![
                Stop::new(pos(200.0), pos(300.0), StopReason::Dwell, "Low movement"),
                Stop::new(pos(0.0), pos(100.0), StopReason::Stop, "High density"),
                Stop::new(pos(1000.0), pos(1100.0), StopReason::Noise, "Noisy data"),
            ],
            &settings,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start.time, at_seconds(0.0));
        assert_eq!(merged[0].end.time, at_seconds(300.0));
        assert_eq!(merged[0].reason, StopReason::Dwell);
        assert_eq!(merged[0].description, "Low movement");
        assert_eq!(merged[1].reason, StopReason::Noise);
    }

    #[test]
    fn points_inside_stops_are_removed() {
        let settings = settings();
        let segment = TrackBuilder::new(47.6, -122.3)
            .leg(100, 1.4, 0.0)
            .segment(&settings);
        let stop = Stop::new(pos(40.0), pos(60.0), StopReason::Stop, "test");
        let pieces = remove_points_in_stops(vec![segment], &[stop], &settings).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].end().time, at_seconds(39.0));
        assert_eq!(pieces[1].start().time, at_seconds(61.0));
        assert_eq!(pieces[0].end().derived.kmh, 0.0);
    }

    fn run(start: f64, end: f64, kind: LowQualityType) -> LowQualityRun {
        LowQualityRun {
            start: pos(start),
            end: pos(end),
            kind,
            description: String::new(),
            distance_km: 0.0,
        }
    }

    fn star_vectors(from: f64) -> Vec<Vector> {
        // Back and forth across the same spot, crossing each other.
        let spokes = [(0.0, 0.0004), (0.0003, -0.0003), (-0.0003, -0.0003), (0.0004, 0.0), (-0.0004, 0.0001)];
        let mut vectors = Vec::new();
        let mut time = from;
        for (dlat, dlon) in spokes {
            let start = Position {
                latitude: 47.6 - dlat,
                longitude: -122.3 - dlon,
                time: at_seconds(time),
            };
            let end = Position {
                latitude: 47.6 + dlat,
                longitude: -122.3 + dlon,
                time: at_seconds(time + 10.0),
            };
            vectors.push(Vector::between(&start, &end));
            time += 10.0;
        }
        vectors
    }

    #[test]
    fn crossing_vectors_are_noisy() {
        let settings = settings();
        let vectors = star_vectors(0.0);
        assert!(are_vectors_noisy(&vectors, at_seconds(0.0), at_seconds(50.0), &settings));

        let straight: Vec<Vector> = (0..5)
            .map(|i| {
                let start = Position {
                    latitude: 47.6 + i as f64 * 0.001,
                    longitude: -122.3,
                    time: at_seconds(i as f64 * 10.0),
                };
                let end = Position {
                    latitude: 47.6 + (i + 1) as f64 * 0.001,
                    longitude: -122.3,
                    time: at_seconds(i as f64 * 10.0 + 10.0),
                };
                Vector::between(&start, &end)
            })
            .collect();
        assert!(!are_vectors_noisy(&straight, at_seconds(0.0), at_seconds(50.0), &settings));
        assert!(!are_vectors_noisy(&[], at_seconds(0.0), at_seconds(50.0), &settings));
    }

    #[test]
    fn dense_noisy_cluster_becomes_dwell() {
        let settings = settings();
        let runs: Vec<_> = (0..8)
            .map(|i| {
                let start = i as f64 * 6.0;
                run(start, start + 3.0, LowQualityType::BigSpeedChanges)
            })
            .collect();
        let (remaining, dwells) = cluster_dwells(runs, &star_vectors(0.0), &settings);
        assert!(remaining.is_empty());
        assert_eq!(dwells.len(), 1);
        assert_eq!(dwells[0].reason, StopReason::Dwell);
        assert_eq!(dwells[0].start.time, at_seconds(0.0));
        assert_eq!(dwells[0].end.time, at_seconds(45.0));
    }

    #[test]
    fn sparse_cluster_keeps_its_runs() {
        let settings = settings();
        let runs: Vec<_> = (0..3)
            .map(|i| {
                let start = i as f64 * 6.0;
                run(start, start + 3.0, LowQualityType::BigSpeedChanges)
            })
            .collect();
        let (remaining, dwells) = cluster_dwells(runs, &star_vectors(0.0), &settings);
        assert_eq!(remaining.len(), 3);
        assert!(dwells.is_empty());
    }
}
