use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{self, Bounds};
use crate::transport;
use crate::TrackError;

/// Anything with a coordinate and a timestamp.
pub trait GeoPoint {
    fn latitude(&self) -> f64;
    fn longitude(&self) -> f64;
    fn time(&self) -> DateTime<Utc>;

    fn position(&self) -> Position {
        Position {
            latitude: self.latitude(),
            longitude: self.longitude(),
            time: self.time(),
        }
    }

    /// Signed seconds from `self` to `other`, millisecond resolution.
    fn seconds_to<P: GeoPoint + ?Sized>(&self, other: &P) -> f64 {
        (other.time() - self.time()).num_milliseconds() as f64 / 1000.0
    }

    fn meters_to<P: GeoPoint + ?Sized>(&self, other: &P) -> f64 {
        geo::distance_meters(
            self.latitude(),
            self.longitude(),
            other.latitude(),
            other.longitude(),
        )
    }

    fn bearing_to<P: GeoPoint + ?Sized>(&self, other: &P) -> i32 {
        geo::bearing(
            self.latitude(),
            self.longitude(),
            other.latitude(),
            other.longitude(),
        )
    }

    fn kmh_to<P: GeoPoint + ?Sized>(&self, other: &P) -> f64 {
        geo::speed_kmh(self.meters_to(other), self.seconds_to(other))
    }

    fn same_place<P: GeoPoint + ?Sized>(&self, other: &P) -> bool {
        self.latitude() == other.latitude() && self.longitude() == other.longitude()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub time: DateTime<Utc>,
}

impl GeoPoint for Position {
    fn latitude(&self) -> f64 {
        self.latitude
    }
    fn longitude(&self) -> f64 {
        self.longitude
    }
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Values derived from a point and its neighbours. Rebuilt wholesale by
/// [`crate::kinematics::populate`] whenever a segment's membership changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// Bearing to the next point.
    pub course: i32,
    pub meters: f64,
    pub seconds: f64,
    pub mps: f64,
    pub kmh: f64,
    /// Signed bearing change from this step to the next one.
    pub delta_course: i32,
    pub acceleration: f64,
    pub acceleration_grade: f64,
    pub smoothed_course: i32,
    pub smoothed_kmh: f64,
    pub transportation: Vec<TransportationType>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_course: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vdop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdop: Option<f64>,
    pub derived: Kinematics,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64, time: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            time,
            elevation: None,
            device_speed: None,
            device_course: None,
            fix: None,
            hdop: None,
            vdop: None,
            pdop: None,
            derived: Kinematics::default(),
        }
    }

    /// Top transportation mode for this point alone.
    pub fn top_mode(&self) -> Option<TransportationMode> {
        self.derived.transportation.first().map(|t| t.mode)
    }
}

impl GeoPoint for TrackPoint {
    fn latitude(&self) -> f64 {
        self.latitude
    }
    fn longitude(&self) -> f64 {
        self.longitude
    }
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Time-ordered, non-empty run of points believed to be continuous travel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    points: Vec<TrackPoint>,
}

impl Segment {
    pub fn new(points: Vec<TrackPoint>) -> Result<Self, TrackError> {
        if points.is_empty() {
            return Err(TrackError::InternalInvariant(
                "segment created without points".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<TrackPoint> {
        self.points
    }

    pub fn start(&self) -> &TrackPoint {
        &self.points[0]
    }

    pub fn end(&self) -> &TrackPoint {
        &self.points[self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn seconds(&self) -> f64 {
        self.start().seconds_to(self.end())
    }

    pub fn kilometers(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| pair[0].meters_to(&pair[1]))
            .sum::<f64>()
            / 1000.0
    }

    pub fn speed_kmh(&self) -> f64 {
        let seconds = self.seconds();
        if seconds <= 0.001 {
            return 0.0;
        }
        self.kilometers() / (seconds / 3600.0)
    }

    pub fn course(&self) -> i32 {
        self.start().bearing_to(self.end())
    }

    pub fn bounds(&self) -> Bounds {
        let first = self.start();
        let mut bounds = Bounds::around(first.latitude, first.longitude);
        for point in &self.points[1..] {
            bounds.extend(point.latitude, point.longitude);
        }
        bounds
    }

    /// Per-mode probabilities averaged over the segment's points.
    pub fn transportation(&self) -> Vec<TransportationType> {
        transport::dominant_modes(&self.points)
    }

    pub fn contains_time(&self, time: DateTime<Utc>) -> bool {
        self.start().time <= time && time <= self.end().time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    LargeGap,
    SmallGap,
    LowMovement,
    JumpingCourse,
    JumpingSpeed,
    HighDensityJumpingCourse,
    /// What remains of a break after an earlier one claimed the span they share.
    Overlapping,
}

/// Interval in a track where continuous travel is interrupted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Break {
    pub start: Position,
    pub end: Position,
    pub reason: BreakReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_distance_meters: Option<f64>,
}

impl Break {
    pub fn new(start: Position, end: Position, reason: BreakReason) -> Self {
        Self {
            start,
            end,
            reason,
            total_duration_seconds: None,
            total_distance_meters: None,
        }
    }

    pub fn with_totals(mut self, seconds: f64, meters: f64) -> Self {
        self.total_duration_seconds = Some(seconds);
        self.total_distance_meters = Some(meters);
        self
    }

    pub fn duration_seconds(&self) -> f64 {
        self.start.seconds_to(&self.end)
    }

    pub fn distance_meters(&self) -> f64 {
        self.start.meters_to(&self.end)
    }

    pub fn speed_mps(&self) -> f64 {
        let seconds = self.duration_seconds();
        if seconds <= 0.001 {
            return 0.0;
        }
        self.distance_meters() / seconds
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowQualityType {
    NoMovement,
    LowMovement,
    BigSpeedChanges,
    BigCourseChanges,
    MissingData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LowQualityRun {
    pub start: Position,
    pub end: Position,
    #[serde(rename = "type")]
    pub kind: LowQualityType,
    pub description: String,
    pub distance_km: f64,
}

impl LowQualityRun {
    pub fn duration_seconds(&self) -> f64 {
        self.start.seconds_to(&self.end)
    }

    /// Average speed from start to end, ignoring the path in between.
    pub fn net_kmh(&self) -> f64 {
        self.start.kmh_to(&self.end)
    }

    pub fn midpoint(&self) -> Position {
        midpoint(&self.start, &self.end)
    }

    pub fn is_movement(&self) -> bool {
        matches!(
            self.kind,
            LowQualityType::NoMovement | LowQualityType::LowMovement
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Dwell,
    Noise,
    Gap,
    Waypoint,
}

impl StopReason {
    /// Higher wins when overlapping stops are merged.
    pub fn priority(self) -> u8 {
        match self {
            StopReason::Dwell => 4,
            StopReason::Noise => 3,
            StopReason::Stop => 2,
            StopReason::Gap => 1,
            StopReason::Waypoint => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub start: Position,
    pub end: Position,
    pub reason: StopReason,
    pub description: String,
}

impl Stop {
    pub fn new(start: Position, end: Position, reason: StopReason, description: &str) -> Self {
        Self {
            start,
            end,
            reason,
            description: description.to_string(),
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.start.seconds_to(&self.end)
    }

    pub fn distance_km(&self) -> f64 {
        self.start.meters_to(&self.end) / 1000.0
    }

    pub fn midpoint(&self) -> Position {
        midpoint(&self.start, &self.end)
    }

    pub fn contains_time(&self, time: DateTime<Utc>) -> bool {
        self.start.time <= time && time <= self.end.time
    }

    pub fn contains_run(&self, run: &LowQualityRun) -> bool {
        self.contains_time(run.start.time) && self.contains_time(run.end.time)
    }
}

/// Straight-line approximation of a stretch of points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub start: Position,
    pub end: Position,
    pub bearing: i32,
}

impl Vector {
    pub fn between<A: GeoPoint + ?Sized, B: GeoPoint + ?Sized>(start: &A, end: &B) -> Self {
        Self {
            start: start.position(),
            end: end.position(),
            bearing: start.bearing_to(end),
        }
    }

    pub fn meters(&self) -> f64 {
        self.start.meters_to(&self.end)
    }

    pub fn seconds(&self) -> f64 {
        self.start.seconds_to(&self.end)
    }

    pub fn kmh(&self) -> f64 {
        self.start.kmh_to(&self.end)
    }

    /// Whether the vector touches the `[from, to]` time range.
    pub fn overlaps_time(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.end.time >= from && self.start.time <= to
    }
}

/// Ordered by the fixed speed-profile table; ties in probability keep this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportationMode {
    Foot,
    Bicycle,
    Car,
    Train,
    Airplane,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportationType {
    pub probability: f64,
    pub mode: TransportationMode,
}

impl TransportationType {
    pub fn new(mode: TransportationMode, probability: f64) -> Self {
        Self { probability, mode }
    }
}

/// Stop-derived extent attached to a waypoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopSpan {
    pub start: Position,
    pub end: Position,
    pub distance_km: f64,
    pub duration_seconds: f64,
    pub speed_kmh: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    pub reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<StopSpan>,
}

impl Waypoint {
    /// Waypoint at the midpoint of a detected stop.
    pub fn from_stop(stop: &Stop) -> Self {
        let middle = stop.midpoint();
        let duration_seconds = stop.duration_seconds();
        let distance_km = stop.distance_km();
        Self {
            latitude: middle.latitude,
            longitude: middle.longitude,
            time: middle.time,
            name: None,
            description: Some(stop.description.clone()),
            elevation: None,
            reason: stop.reason,
            span: Some(StopSpan {
                start: stop.start,
                end: stop.end,
                distance_km,
                duration_seconds,
                speed_kmh: geo::speed_kmh(distance_km * 1000.0, duration_seconds),
            }),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.span.as_ref().map_or(self.time, |span| span.start.time)
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.span.as_ref().map_or(self.time, |span| span.end.time)
    }
}

impl GeoPoint for Waypoint {
    fn latitude(&self) -> f64 {
        self.latitude
    }
    fn longitude(&self) -> f64 {
        self.longitude
    }
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementCategory {
    Walking,
    Vehicle,
    StoppedWalking,
    StoppedVehicle,
    GapVehicle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementItem {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub category: MovementCategory,
}

/// Average of the two coordinates, timestamped halfway between them.
pub fn midpoint(start: &Position, end: &Position) -> Position {
    let half = (end.time - start.time) / 2;
    Position {
        latitude: (start.latitude + end.latitude) / 2.0,
        longitude: (start.longitude + end.longitude) / 2.0,
        time: start.time + half,
    }
}
