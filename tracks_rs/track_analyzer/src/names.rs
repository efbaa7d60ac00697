//! Place-name and timezone resolution.
//!
//! The analyzer only decides *where* to ask; the actual lookups sit behind
//! [`PlaceNameLookup`] and [`TimezoneLookup`], and a failing lookup never
//! fails the analysis.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{
    GeoPoint, LowQualityRun, MovementCategory, MovementItem, Position, Segment, Waypoint,
};
use crate::settings::AnalyzerSettings;
use crate::transport;
use crate::TrackError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NameRequest {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Placename {
    pub full_description: String,
    #[serde(default)]
    pub sites: Vec<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimezoneInfo {
    pub id: String,
    pub tag: String,
}

/// Names ranked by how long the track spent near them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationNames {
    pub countries: Vec<String>,
    pub states: Vec<String>,
    pub cities: Vec<String>,
    pub sites: Vec<String>,
}

pub trait PlaceNameLookup: Send + Sync {
    /// One result per request, in order.
    fn resolve(&self, requests: &[NameRequest]) -> Result<Vec<Placename>, TrackError>;
}

pub trait TimezoneLookup: Send + Sync {
    fn at(&self, lat: f64, lon: f64) -> Result<Option<TimezoneInfo>, TrackError>;
}

/// A location worth naming and the seconds spent there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedRequest {
    pub request: NameRequest,
    pub seconds: f64,
}

impl WeightedRequest {
    fn at<P: GeoPoint + ?Sized>(point: &P, seconds: f64) -> Self {
        Self {
            request: NameRequest {
                lat: point.latitude(),
                lon: point.longitude(),
            },
            seconds,
        }
    }
}

/// Short pauses while on foot, walking stops, and points along walking
/// segments spaced by both distance and time.
pub fn build_requests(
    segments: &[Segment],
    waypoints: &[Waypoint],
    runs: &[LowQualityRun],
    timeline: &[MovementItem],
    settings: &AnalyzerSettings,
) -> Vec<WeightedRequest> {
    let categories: HashMap<_, _> = timeline
        .iter()
        .map(|item| (item.start_time, item.category))
        .collect();
    let mut requests = Vec::new();

    for run in runs {
        if !run.is_movement()
            || run.duration_seconds() >= settings.min_seconds_low_movement_for_stop
        {
            continue;
        }
        let on_foot = segments
            .iter()
            .find(|s| s.contains_time(run.start.time) && s.contains_time(run.end.time))
            .map_or(true, |s| transport::is_on_foot(&s.transportation()));
        if on_foot {
            requests.push(WeightedRequest::at(&run.midpoint(), run.duration_seconds()));
        }
    }

    for waypoint in waypoints {
        let Some(span) = &waypoint.span else {
            continue;
        };
        if categories.get(&span.start.time) == Some(&MovementCategory::StoppedWalking) {
            requests.push(WeightedRequest::at(waypoint, span.duration_seconds));
        }
    }

    for segment in segments {
        if categories.get(&segment.start().time) != Some(&MovementCategory::Walking) {
            continue;
        }
        requests.extend(walking_requests(segment, settings));
    }
    requests
}

fn walking_requests(segment: &Segment, settings: &AnalyzerSettings) -> Vec<WeightedRequest> {
    let points = segment.points();
    let mut requests = vec![WeightedRequest::at(segment.start(), segment.seconds())];
    let mut last: Position = segment.start().position();
    for point in &points[1..points.len().saturating_sub(1)] {
        if last.meters_to(point) >= settings.max_meters_between_placenames
            && last.seconds_to(point) >= settings.max_seconds_between_placenames
        {
            requests.push(WeightedRequest::at(point, 0.0));
            last = point.position();
        }
    }
    if points.len() > 1 {
        requests.push(WeightedRequest::at(segment.end(), 0.0));
    }
    requests
}

/// Sums seconds per name and orders each list by time spent, then name.
pub fn rank(names: &[Placename], seconds: &[f64]) -> LocationNames {
    let mut countries = HashMap::new();
    let mut states = HashMap::new();
    let mut cities = HashMap::new();
    let mut sites = HashMap::new();
    for (name, weight) in names.iter().zip(seconds) {
        let add = |table: &mut HashMap<String, f64>, value: &Option<String>| {
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                *table.entry(value.clone()).or_insert(0.0) += weight;
            }
        };
        add(&mut countries, &name.country_name);
        add(&mut states, &name.state);
        add(&mut cities, &name.city);
        for site in &name.sites {
            add(&mut sites, &Some(site.clone()));
        }
    }
    LocationNames {
        countries: ordered(countries),
        states: ordered(states),
        cities: ordered(cities),
        sites: ordered(sites),
    }
}

fn ordered(table: HashMap<String, f64>) -> Vec<String> {
    let mut entries: Vec<(String, f64)> = table.into_iter().collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries.into_iter().map(|(name, _)| name).collect()
}

/// Resolves and ranks names; lookup failures are logged and yield no names.
pub fn resolve_names(
    lookup: Option<&dyn PlaceNameLookup>,
    requests: &[WeightedRequest],
) -> LocationNames {
    let Some(lookup) = lookup else {
        return LocationNames::default();
    };
    if requests.is_empty() {
        return LocationNames::default();
    }
    let plain: Vec<NameRequest> = requests.iter().map(|r| r.request).collect();
    match lookup.resolve(&plain) {
        Ok(names) => {
            if names.len() != requests.len() {
                warn!(
                    requested = requests.len(),
                    received = names.len(),
                    "place name lookup returned a different number of results"
                );
            }
            let seconds: Vec<f64> = requests.iter().map(|r| r.seconds).collect();
            rank(&names, &seconds)
        }
        Err(err) => {
            warn!(error = %err, "place name lookup failed");
            LocationNames::default()
        }
    }
}

pub fn resolve_timezone(
    lookup: Option<&dyn TimezoneLookup>,
    at: Option<&Position>,
) -> Option<TimezoneInfo> {
    let (lookup, at) = (lookup?, at?);
    match lookup.at(at.latitude, at.longitude) {
        Ok(info) => info,
        Err(err) => {
            warn!(error = %err, "timezone lookup failed");
            None
        }
    }
}
