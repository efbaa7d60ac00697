use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::TrackError;

/// Every tunable threshold used by the stages. Missing keys in a JSON
/// settings file fall back to the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    // gaps
    pub max_seconds_between_points: f64,
    pub small_gap_seconds: f64,

    // low-quality runs
    pub movement_min_speed_meters_second: f64,
    pub low_movement_min_seconds: f64,
    pub zero_speed_kmh: f64,
    pub zero_speed_min_seconds: f64,
    pub short_merge_max_meters_by_distance: f64,
    pub short_merge_max_seconds_by_distance: f64,
    pub short_merge_max_meters_by_time: f64,
    pub short_merge_max_seconds_by_time: f64,
    pub long_run_min_seconds: f64,
    pub long_merge_max_meters: f64,
    pub long_merge_max_seconds: f64,
    pub big_speed_change_grade: f64,
    pub missing_data_seconds: f64,

    // kinematics
    pub speed_smoothing_seconds: f64,
    pub gauss_kernel_width: usize,
    pub transportation_top_modes: usize,

    // anomalies
    pub anomaly_grade: f64,
    pub anomaly_lead_in_points: usize,

    // jumping
    pub jumping_min_meters: f64,
    pub jumping_course_degrees: i32,
    pub jumping_speed_kmh: f64,
    pub high_density_max_seconds: f64,
    pub high_density_max_meters: f64,
    pub high_density_min_neighbors: usize,
    pub high_density_min_jumps: usize,
    pub high_density_max_sparse: usize,

    // break consolidation
    pub jump_merge_seconds: f64,
    pub break_merge_seconds: f64,
    pub dwell_break_min_seconds: f64,

    // stops
    pub min_seconds_low_movement_for_stop: f64,
    pub min_seconds_between_stops: f64,
    pub density_points_delta: usize,
    pub density_radius_meters: f64,
    pub density_minimum: usize,
    pub density_min_points_between_clouds: usize,
    pub density_minimum_cloud_length: usize,
    pub density_minimum_cloud_seconds: f64,
    pub density_minimum_ratio: f64,
    pub dwell_cluster_max_meters: f64,
    pub dwell_cluster_max_seconds: f64,
    pub dwell_cluster_min_notable: usize,
    pub sharp_turn_threshold: i32,

    // vectors
    pub vector_split_degrees: i32,
    pub vector_merge_degrees: i32,
    pub vector_min_initial_meters: f64,
    pub vector_course_change_degrees: i32,

    // segments and timeline
    pub foot_split_window_seconds: f64,
    pub min_segment_seconds: f64,
    pub walking_foot_probability: f64,
    pub movement_gap_seconds: f64,

    // place names
    pub max_meters_between_placenames: f64,
    pub max_seconds_between_placenames: f64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            max_seconds_between_points: 10.0,
            small_gap_seconds: 1.0,

            movement_min_speed_meters_second: 0.32,
            low_movement_min_seconds: 15.0,
            zero_speed_kmh: 0.60,
            zero_speed_min_seconds: 10.0,
            short_merge_max_meters_by_distance: 5.0,
            short_merge_max_seconds_by_distance: 60.0,
            short_merge_max_meters_by_time: 20.0,
            short_merge_max_seconds_by_time: 15.0,
            long_run_min_seconds: 240.0,
            long_merge_max_meters: 20.0,
            long_merge_max_seconds: 300.0,
            big_speed_change_grade: 2.0,
            missing_data_seconds: 3.0,

            speed_smoothing_seconds: 6.0,
            gauss_kernel_width: 7,
            transportation_top_modes: 2,

            anomaly_grade: 6.0,
            anomaly_lead_in_points: 10,

            jumping_min_meters: 1.0,
            jumping_course_degrees: 75,
            jumping_speed_kmh: 9.0,
            high_density_max_seconds: 300.0,
            high_density_max_meters: 200.0,
            high_density_min_neighbors: 7,
            high_density_min_jumps: 4,
            high_density_max_sparse: 4,

            jump_merge_seconds: 2.0,
            break_merge_seconds: 11.0,
            dwell_break_min_seconds: 300.0,

            min_seconds_low_movement_for_stop: 30.0,
            min_seconds_between_stops: 120.0,
            density_points_delta: 20,
            density_radius_meters: 15.0,
            density_minimum: 30,
            density_min_points_between_clouds: 30,
            density_minimum_cloud_length: 10,
            density_minimum_cloud_seconds: 60.0,
            density_minimum_ratio: 0.66,
            dwell_cluster_max_meters: 40.0,
            dwell_cluster_max_seconds: 60.0,
            dwell_cluster_min_notable: 7,
            sharp_turn_threshold: 45,

            vector_split_degrees: 10,
            vector_merge_degrees: 20,
            vector_min_initial_meters: 2.0,
            vector_course_change_degrees: 90,

            foot_split_window_seconds: 60.0,
            min_segment_seconds: 5.0,
            walking_foot_probability: 0.65,
            movement_gap_seconds: 15.0,

            max_meters_between_placenames: 50.0,
            max_seconds_between_placenames: 300.0,
        }
    }
}

impl AnalyzerSettings {
    pub fn from_json_str(text: &str) -> Result<Self, TrackError> {
        let settings: AnalyzerSettings =
            serde_json::from_str(text).map_err(|e| TrackError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        let positive = [
            ("max_seconds_between_points", self.max_seconds_between_points),
            ("speed_smoothing_seconds", self.speed_smoothing_seconds),
            ("foot_split_window_seconds", self.foot_split_window_seconds),
            ("density_radius_meters", self.density_radius_meters),
            ("anomaly_grade", self.anomaly_grade),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TrackError::Settings(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.gauss_kernel_width < 2 {
            return Err(TrackError::Settings(
                "gauss_kernel_width must be at least 2".to_string(),
            ));
        }
        if self.transportation_top_modes == 0 {
            return Err(TrackError::Settings(
                "transportation_top_modes must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("density_minimum_ratio", self.density_minimum_ratio),
            ("walking_foot_probability", self.walking_foot_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TrackError::Settings(format!(
                    "{name} must be within 0..=1, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Stable hash of the effective settings, recorded alongside results.
    pub fn fingerprint(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalyzerSettings::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = AnalyzerSettings::from_json_str(r#"{"max_seconds_between_points": 20.0}"#)
            .unwrap();
        assert_eq!(settings.max_seconds_between_points, 20.0);
        assert_eq!(settings.min_seconds_between_stops, 120.0);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = AnalyzerSettings::from_json_str(r#"{"density_minimum_ratio": 1.5}"#).unwrap_err();
        assert!(matches!(err, TrackError::Settings(_)));
        let err = AnalyzerSettings::from_json_str(r#"{"gauss_kernel_width": 0}"#).unwrap_err();
        assert!(matches!(err, TrackError::Settings(_)));
    }

    #[test]
    fn fingerprint_tracks_changes() {
        let defaults = AnalyzerSettings::default();
        let mut tweaked = defaults.clone();
        tweaked.density_minimum = 31;
        assert_eq!(defaults.fingerprint(), AnalyzerSettings::default().fingerprint());
        assert_ne!(defaults.fingerprint(), tweaked.fingerprint());
        assert_eq!(defaults.fingerprint().len(), 64);
    }
}
