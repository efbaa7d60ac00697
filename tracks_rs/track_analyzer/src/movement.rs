//! Collapses segments and stops into a walking / vehicle timeline.

use chrono::{DateTime, Duration, Utc};

use crate::model::{MovementCategory, MovementItem, Segment, TransportationMode, Waypoint};
use crate::settings::AnalyzerSettings;
use crate::transport;

enum Item<'a> {
    Segment(&'a Segment),
    Stop(&'a Waypoint),
}

impl Item<'_> {
    fn start(&self) -> DateTime<Utc> {
        match self {
            Item::Segment(segment) => segment.start().time,
            Item::Stop(waypoint) => waypoint.start_time(),
        }
    }

    fn end(&self) -> DateTime<Utc> {
        match self {
            Item::Segment(segment) => segment.end().time,
            Item::Stop(waypoint) => waypoint.end_time(),
        }
    }
}

pub fn segment_category(speed_kmh: f64, settings: &AnalyzerSettings) -> MovementCategory {
    if speed_kmh <= 0.01 {
        return MovementCategory::Walking;
    }
    let top = transport::classify(speed_kmh, settings.transportation_top_modes);
    match top.first() {
        Some(t)
            if t.mode == TransportationMode::Foot
                && t.probability >= settings.walking_foot_probability =>
        {
            MovementCategory::Walking
        }
        _ => MovementCategory::Vehicle,
    }
}

/// Interleaves segments and stop waypoints by start time (a stop first when
/// it starts strictly earlier) and categorises each one.
pub fn categorize(
    segments: &[Segment],
    waypoints: &[Waypoint],
    settings: &AnalyzerSettings,
) -> Vec<MovementItem> {
    let mut segments: Vec<&Segment> = segments.iter().collect();
    segments.sort_by_key(|s| s.start().time);
    let mut stops: Vec<&Waypoint> = waypoints.iter().collect();
    stops.sort_by_key(|w| w.start_time());

    let mut ordered = Vec::with_capacity(segments.len() + stops.len());
    let (mut si, mut wi) = (0, 0);
    while si < segments.len() || wi < stops.len() {
        let take_stop = match (segments.get(si), stops.get(wi)) {
            (Some(segment), Some(stop)) => stop.start_time() < segment.start().time,
            (None, Some(_)) => true,
            _ => false,
        };
        if take_stop {
            ordered.push(Item::Stop(stops[wi]));
            wi += 1;
        } else {
            ordered.push(Item::Segment(segments[si]));
            si += 1;
        }
    }

    let mut timeline: Vec<MovementItem> = Vec::with_capacity(ordered.len());
    let mut last_moving: Option<MovementCategory> = None;
    for item in ordered {
        if let Some(previous) = timeline.last() {
            let gap = (item.start() - previous.end_time).num_milliseconds() as f64 / 1000.0;
            if gap >= settings.movement_gap_seconds {
                timeline.push(MovementItem {
                    start_time: previous.end_time + Duration::seconds(1),
                    end_time: item.start() - Duration::seconds(1),
                    category: MovementCategory::GapVehicle,
                });
            }
        }
        let category = match &item {
            Item::Segment(segment) => {
                let category = segment_category(segment.speed_kmh(), settings);
                last_moving = Some(category);
                category
            }
            Item::Stop(_) => match last_moving {
                Some(MovementCategory::Vehicle) => MovementCategory::StoppedVehicle,
                _ => MovementCategory::StoppedWalking,
            },
        };
        timeline.push(MovementItem {
            start_time: item.start(),
            end_time: item.end(),
            category,
        });
    }
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Position, Stop, StopReason};
    use crate::test_support::{at_seconds, TrackBuilder};

    fn stop(start: f64, end: f64) -> Waypoint {
        let pos = |s: f64| Position {
            latitude: 47.6,
            longitude: -122.3,
            time: at_seconds(s),
        };
        Waypoint::from_stop(&Stop::new(pos(start), pos(end), StopReason::Stop, "test"))
    }

    #[test]
    fn walking_speeds_are_walking() {
        let settings = AnalyzerSettings::default();
        assert_eq!(segment_category(0.0, &settings), MovementCategory::Walking);
        assert_eq!(segment_category(5.0, &settings), MovementCategory::Walking);
        assert_eq!(segment_category(60.0, &settings), MovementCategory::Vehicle);
        // Foot at 0.5 is below the walking cutoff.
        assert_eq!(segment_category(7.0, &settings), MovementCategory::Vehicle);
    }

    #[test]
    fn stops_take_the_preceding_mode() {
        let settings = AnalyzerSettings::default();
        let walk = TrackBuilder::new(47.6, -122.3)
            .leg(60, 1.4, 0.0)
            .segment(&settings);
        let timeline = categorize(&[walk], &[stop(61.0, 120.0)], &settings);
        let categories: Vec<_> = timeline.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![MovementCategory::Walking, MovementCategory::StoppedWalking]
        );
    }

    #[test]
    fn long_gaps_become_gap_vehicle() {
        let settings = AnalyzerSettings::default();
        let drive = TrackBuilder::new(47.6, -122.3)
            .leg(60, 20.0, 0.0)
            .segment(&settings);
        let timeline = categorize(&[drive], &[stop(100.0, 200.0)], &settings);
        let categories: Vec<_> = timeline.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![
                MovementCategory::Vehicle,
                MovementCategory::GapVehicle,
                MovementCategory::StoppedVehicle
            ]
        );
        assert_eq!(timeline[1].start_time, at_seconds(61.0));
        assert_eq!(timeline[1].end_time, at_seconds(99.0));
    }

    #[test]
    fn marked_waypoint_is_an_instant_stop() {
        let settings = AnalyzerSettings::default();
        let walk = TrackBuilder::new(47.6, -122.3)
            .leg(60, 1.4, 0.0)
            .segment(&settings);
        let marker = Waypoint {
            latitude: 47.6,
            longitude: -122.3,
            time: at_seconds(70.0),
            name: Some("Bench".to_string()),
            description: None,
            elevation: None,
            reason: StopReason::Waypoint,
            span: None,
        };
        let timeline = categorize(&[walk], &[marker], &settings);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[1].category, MovementCategory::StoppedWalking);
        assert_eq!(timeline[1].start_time, at_seconds(70.0));
        assert_eq!(timeline[1].end_time, at_seconds(70.0));
    }

    #[test]
    fn stop_before_first_segment_is_walking() {
        let settings = AnalyzerSettings::default();
        let timeline = categorize(&[], &[stop(0.0, 10.0)], &settings);
        assert_eq!(timeline[0].category, MovementCategory::StoppedWalking);
    }
}
