//! Trajectory analysis for recorded GPS tracks.
//!
//! A raw track (timestamped fixes with gaps and noise) is turned into
//! segments, breaks, low-quality runs, stops, directional vectors and a
//! movement timeline. [`GpsAnalyzer`] runs the stages in order over a
//! [`Workspace`] it exclusively owns and produces a [`ProcessedTrack`].

use thiserror::Error;

pub mod anomaly;
pub mod breaks;
pub mod codec;
pub mod foot_split;
pub mod gaps;
pub mod geo;
pub mod jumping;
pub mod kinematics;
pub mod low_quality;
pub mod model;
pub mod movement;
pub mod names;
pub mod pipeline;
pub mod settings;
pub mod stops;
pub mod transport;
pub mod vectors;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use codec::{parse_track_input, RawPoint, RawTrack, TrackInput};
pub use model::{
    Break, BreakReason, GeoPoint, LowQualityRun, LowQualityType, MovementCategory, MovementItem,
    Position, Segment, Stop, StopReason, StopSpan, TrackPoint, TransportationMode,
    TransportationType, Vector, Waypoint,
};
pub use names::{LocationNames, NameRequest, PlaceNameLookup, Placename, TimezoneInfo, TimezoneLookup};
pub use pipeline::{analyze, GpsAnalyzer};
pub use settings::AnalyzerSettings;
pub use workspace::{ProcessedSegment, ProcessedTrack, ProcessedTrackGroup, Workspace};

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("invalid point {index} in track {track}, segment {segment}: {reason}")]
    InvalidPoint {
        track: usize,
        segment: usize,
        index: usize,
        reason: String,
    },
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
    #[error("failed to parse FIT file: {0}")]
    FitParse(String),
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl TrackError {
    /// True for programming errors, as opposed to problems with the input data.
    pub fn is_internal(&self) -> bool {
        matches!(self, TrackError::InternalInvariant(_))
    }
}
