//! Speed-profile classification into transportation modes.

use std::collections::BTreeMap;

use crate::model::{TrackPoint, TransportationMode, TransportationType};

const MIN_PROBABILITY: f64 = 0.01;

/// Speed envelope of one mode, in km/h.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedProfile {
    pub mode: TransportationMode,
    pub absolute_minimum: f64,
    pub nominal_minimum: f64,
    pub nominal_maximum: f64,
    pub absolute_maximum: f64,
}

pub const SPEED_PROFILES: [SpeedProfile; 5] = [
    SpeedProfile {
        mode: TransportationMode::Foot,
        absolute_minimum: 0.0,
        nominal_minimum: 0.0,
        nominal_maximum: 6.6,
        absolute_maximum: 7.4,
    },
    SpeedProfile {
        mode: TransportationMode::Bicycle,
        absolute_minimum: 6.6,
        nominal_minimum: 12.0,
        nominal_maximum: 34.0,
        absolute_maximum: 41.0,
    },
    SpeedProfile {
        mode: TransportationMode::Car,
        absolute_minimum: 16.0,
        nominal_minimum: 25.0,
        nominal_maximum: 128.0,
        absolute_maximum: 160.0,
    },
    SpeedProfile {
        mode: TransportationMode::Train,
        absolute_minimum: 90.0,
        nominal_minimum: 100.0,
        nominal_maximum: 320.0,
        absolute_maximum: 370.0,
    },
    SpeedProfile {
        mode: TransportationMode::Airplane,
        absolute_minimum: 100.0,
        nominal_minimum: 160.0,
        nominal_maximum: 800.0,
        absolute_maximum: 1000.0,
    },
];

impl SpeedProfile {
    /// Likelihood that `kmh` belongs to this mode, or `None` outside the
    /// absolute envelope.
    pub fn probability(&self, kmh: f64) -> Option<f64> {
        if kmh < self.absolute_minimum || kmh > self.absolute_maximum {
            return None;
        }
        if kmh >= self.nominal_minimum && kmh <= self.nominal_maximum {
            return Some(1.0);
        }
        let ramp = if kmh < self.nominal_minimum {
            (kmh - self.absolute_minimum) / (self.nominal_minimum - self.absolute_minimum)
        } else {
            (kmh - self.absolute_maximum) / (self.nominal_maximum - self.absolute_maximum)
        };
        Some(ramp.max(MIN_PROBABILITY))
    }
}

/// The `top` most likely modes for a speed, most likely first.
pub fn classify(kmh: f64, top: usize) -> Vec<TransportationType> {
    let mut matches: Vec<TransportationType> = SPEED_PROFILES
        .iter()
        .filter_map(|profile| {
            profile
                .probability(kmh)
                .map(|p| TransportationType::new(profile.mode, p))
        })
        .collect();
    if matches.is_empty() {
        return vec![TransportationType::new(TransportationMode::Unknown, 1.0)];
    }
    sort_by_probability(&mut matches);
    matches.truncate(top);
    matches
}

/// Averages per-point probabilities into a ranking for a run of points.
pub fn dominant_modes(points: &[TrackPoint]) -> Vec<TransportationType> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut totals: BTreeMap<TransportationMode, f64> = BTreeMap::new();
    for point in points {
        for t in &point.derived.transportation {
            *totals.entry(t.mode).or_insert(0.0) += t.probability;
        }
    }
    let count = points.len() as f64;
    let mut modes: Vec<TransportationType> = totals
        .into_iter()
        .map(|(mode, total)| TransportationType::new(mode, total / count))
        .collect();
    sort_by_probability(&mut modes);
    modes
}

pub fn is_on_foot(modes: &[TransportationType]) -> bool {
    modes
        .first()
        .map_or(false, |t| t.mode == TransportationMode::Foot)
}

// Stable, so equal probabilities keep profile-table order.
fn sort_by_probability(modes: &mut [TransportationType]) {
    modes.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes(kmh: f64) -> Vec<TransportationMode> {
        classify(kmh, 5).into_iter().map(|t| t.mode).collect()
    }

    #[test]
    fn standing_still_is_fully_on_foot() {
        let result = classify(0.0, 2);
        assert_eq!(result, vec![TransportationType::new(TransportationMode::Foot, 1.0)]);
    }

    #[test]
    fn walking_pace_is_foot_only() {
        assert_eq!(modes(5.0), vec![TransportationMode::Foot]);
    }

    #[test]
    fn overlapping_envelopes_rank_by_probability() {
        // 7.0 km/h: foot on its upper ramp, bicycle on its lower ramp.
        let result = classify(7.0, 2);
        assert_eq!(result[0].mode, TransportationMode::Foot);
        assert!((result[0].probability - 0.5).abs() < 1e-9);
        assert_eq!(result[1].mode, TransportationMode::Bicycle);
        assert!((result[1].probability - 0.4 / 5.4).abs() < 1e-9);
    }

    #[test]
    fn equal_probabilities_keep_table_order() {
        // Car and train are both nominal at 110 km/h.
        let result = classify(110.0, 2);
        assert_eq!(result[0].mode, TransportationMode::Car);
        assert_eq!(result[1].mode, TransportationMode::Train);
    }

    #[test]
    fn result_is_truncated_to_top_modes() {
        assert_eq!(classify(110.0, 1).len(), 1);
        assert_eq!(classify(110.0, 5).len(), 3);
    }

    #[test]
    fn beyond_every_profile_is_unknown() {
        assert_eq!(
            classify(1500.0, 2),
            vec![TransportationType::new(TransportationMode::Unknown, 1.0)]
        );
    }

    #[test]
    fn ramps_are_monotonic() {
        for profile in SPEED_PROFILES {
            let steps = 50;
            let mut previous = 0.0;
            for i in 0..=steps {
                let kmh = profile.absolute_minimum
                    + (profile.nominal_minimum - profile.absolute_minimum) * i as f64 / steps as f64;
                let p = profile.probability(kmh).unwrap_or(0.0);
                assert!(p >= previous, "{:?} rising at {}", profile.mode, kmh);
                previous = p;
            }
            let mut previous = 1.0;
            for i in 0..=steps {
                let kmh = profile.nominal_maximum
                    + (profile.absolute_maximum - profile.nominal_maximum) * i as f64 / steps as f64;
                let p = profile.probability(kmh).unwrap_or(0.0);
                assert!(p <= previous, "{:?} falling at {}", profile.mode, kmh);
                previous = p;
            }
        }
    }

    #[test]
    fn dominant_modes_average_over_points() {
        use chrono::{TimeZone, Utc};
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut walking = TrackPoint::new(0.0, 0.0, time);
        walking.derived.transportation = classify(5.0, 2);
        let mut driving = TrackPoint::new(0.0, 0.0, time);
        driving.derived.transportation = classify(60.0, 2);
        let ranking = dominant_modes(&[walking.clone(), walking, driving]);
        assert_eq!(ranking[0].mode, TransportationMode::Foot);
        assert!((ranking[0].probability - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(ranking[1].mode, TransportationMode::Car);
        assert!(is_on_foot(&ranking));
    }
}
