#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Configuration schemas and calibration persistence for the gait pipeline.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated once
//!   at load time, mirroring the teacher's `Config::validate()` pattern.
//! - Calibration is a per-device JSON blob; `load_calibration_json` /
//!   `save_calibration_json` enforce the exact schema of the external
//!   interface and convert into `gait_core`'s runtime calibration types.

use serde::{Deserialize, Serialize};

use gait_core::types::{DeviceCalibration, SensorCalibration};

/// Cycle-detection thresholds, defaulted to the pipeline's pinned constants.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
#[serde(default)]
pub struct DetectorConfig {
    pub height_std_mult: f64,
    pub prominence_std_mult: f64,
    pub min_step_duration_s: f64,
    pub max_step_duration_s: f64,
    pub hs_search_window_s: f64,
    pub to_search_window_s: f64,
    pub to_prominence_std_mult: f64,
    pub outlier_zscore: f64,
    pub min_cycles_for_outlier_removal: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            height_std_mult: 1.5,
            prominence_std_mult: 0.5,
            min_step_duration_s: 0.5,
            max_step_duration_s: 2.5,
            hs_search_window_s: 0.3,
            to_search_window_s: 0.4,
            to_prominence_std_mult: 0.2,
            outlier_zscore: 2.5,
            min_cycles_for_outlier_removal: 3,
        }
    }
}

/// Prefilter cutoff, activity-cutoff table, and cross-fade transition width.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
#[serde(default)]
pub struct FilterConfig {
    pub prefilter_cutoff_hz: f64,
    pub transition_duration_s: f64,
    pub cutoff_standing_hz: f64,
    pub cutoff_walking_hz: f64,
    pub cutoff_stairs_hz: f64,
    pub cutoff_running_hz: f64,
    pub cutoff_jumping_hz: f64,
    pub cutoff_unknown_hz: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            prefilter_cutoff_hz: 20.0,
            transition_duration_s: 0.5,
            cutoff_standing_hz: 2.0,
            cutoff_walking_hz: 6.0,
            cutoff_stairs_hz: 7.0,
            cutoff_running_hz: 12.0,
            cutoff_jumping_hz: 15.0,
            cutoff_unknown_hz: 8.0,
        }
    }
}

/// Activity-classification cascade thresholds, one field per rule.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
#[serde(default)]
pub struct DetectionConfig {
    pub jumping_peak_count_min: usize,
    pub jumping_vertical_variance_min: f64,
    pub jumping_mag_std_min: f64,
    pub standing_sma_max: f64,
    pub standing_mag_std_max: f64,
    pub running_sma_min: f64,
    pub running_cadence_min: f64,
    pub running_spectral_energy_min: f64,
    pub stairs_mag_ratio_min: f64,
    pub stairs_cadence_min: f64,
    pub stairs_cadence_max: f64,
    pub stairs_sma_min: f64,
    pub walking_sma_min: f64,
    pub walking_sma_max: f64,
    pub walking_cadence_min: f64,
    pub walking_cadence_max: f64,
    pub walking_spectral_energy_max: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            jumping_peak_count_min: 3,
            jumping_vertical_variance_min: 5.0,
            jumping_mag_std_min: 0.9,
            standing_sma_max: 0.5,
            standing_mag_std_max: 0.3,
            running_sma_min: 3.0,
            running_cadence_min: 140.0,
            running_spectral_energy_min: 50.0,
            stairs_mag_ratio_min: 1.3,
            stairs_cadence_min: 60.0,
            stairs_cadence_max: 100.0,
            stairs_sma_min: 1.0,
            walking_sma_min: 0.5,
            walking_sma_max: 3.0,
            walking_cadence_min: 80.0,
            walking_cadence_max: 140.0,
            walking_spectral_energy_max: 50.0,
        }
    }
}

/// The external session metadata fields, deserialized at the boundary and
/// validated before the pipeline sees them.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SessionMetadata {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub start_time: Option<String>,
    /// Subject height in meters. Accepts a plausible adult range; callers
    /// passing centimeters should convert before calling `validate`.
    pub height_m: Option<f64>,
    pub user_notes: Option<String>,
    #[serde(default)]
    pub is_baseline: bool,
}

impl SessionMetadata {
    pub fn validate(&self) -> eyre::Result<()> {
        if let Some(h) = self.height_m
            && !(0.5..=2.5).contains(&h)
        {
            eyre::bail!("height_m must be in [0.5, 2.5], got {h}");
        }
        if let Some(id) = &self.session_id
            && id.is_empty()
        {
            eyre::bail!("session_id must not be empty when present");
        }
        Ok(())
    }
}

/// One physical sensor's persisted calibration, as the JSON schema of §6.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct PersistedSensorCalibration {
    pub acc_bias: [f32; 3],
    pub acc_scale: [f32; 3],
    pub gyro_bias: [f32; 3],
    #[serde(default)]
    pub gyro_scale: Option<[f32; 3]>,
    #[serde(default)]
    pub rotation_matrix: Option<[[f32; 3]; 3]>,
}

impl From<PersistedSensorCalibration> for SensorCalibration {
    fn from(p: PersistedSensorCalibration) -> Self {
        SensorCalibration {
            acc_bias: p.acc_bias,
            acc_scale: p.acc_scale,
            gyro_bias: p.gyro_bias,
            gyro_scale: p.gyro_scale.unwrap_or([1.0; 3]),
            rotation_matrix: p.rotation_matrix,
        }
    }
}

impl From<SensorCalibration> for PersistedSensorCalibration {
    fn from(c: SensorCalibration) -> Self {
        PersistedSensorCalibration {
            acc_bias: c.acc_bias,
            acc_scale: c.acc_scale,
            gyro_bias: c.gyro_bias,
            gyro_scale: Some(c.gyro_scale),
            rotation_matrix: c.rotation_matrix,
        }
    }
}

/// The full per-device calibration blob of §6.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PersistedCalibration {
    pub id: String,
    pub last_update: String,
    pub sensor1: PersistedSensorCalibration,
    pub sensor2: PersistedSensorCalibration,
}

impl From<PersistedCalibration> for DeviceCalibration {
    fn from(p: PersistedCalibration) -> Self {
        DeviceCalibration {
            id: p.id,
            last_update: p.last_update,
            sensor1: p.sensor1.into(),
            sensor2: p.sensor2.into(),
        }
    }
}

impl From<DeviceCalibration> for PersistedCalibration {
    fn from(d: DeviceCalibration) -> Self {
        PersistedCalibration {
            id: d.id,
            last_update: d.last_update,
            sensor1: d.sensor1.into(),
            sensor2: d.sensor2.into(),
        }
    }
}

/// Load a calibration JSON blob, erroring (not panicking) on a missing or
/// malformed `sensor1`/`sensor2` key.
pub fn load_calibration_json(path: &std::path::Path) -> eyre::Result<DeviceCalibration> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read calibration blob {:?}: {}", path, e))?;
    let persisted: PersistedCalibration = serde_json::from_str(&text)
        .map_err(|e| eyre::eyre!("decode calibration blob {:?}: {}", path, e))?;
    Ok(persisted.into())
}

/// Serialize a calibration back out to the same JSON schema.
pub fn save_calibration_json(
    path: &std::path::Path,
    calibration: &DeviceCalibration,
) -> eyre::Result<()> {
    let persisted: PersistedCalibration = calibration.clone().into();
    let text = serde_json::to_string_pretty(&persisted)
        .map_err(|e| eyre::eyre!("encode calibration blob: {}", e))?;
    std::fs::write(path, text).map_err(|e| eyre::eyre!("write calibration blob {:?}: {}", path, e))
}

/// Top-level on-disk configuration: the three sub-configs, each defaulted
/// so a caller may override only what it cares about.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.detector.min_step_duration_s <= 0.0 {
            eyre::bail!("detector.min_step_duration_s must be > 0");
        }
        if self.detector.max_step_duration_s <= self.detector.min_step_duration_s {
            eyre::bail!("detector.max_step_duration_s must exceed min_step_duration_s");
        }
        if self.detector.height_std_mult <= 0.0 {
            eyre::bail!("detector.height_std_mult must be > 0");
        }
        if self.detector.outlier_zscore <= 0.0 {
            eyre::bail!("detector.outlier_zscore must be > 0");
        }
        if self.detector.min_cycles_for_outlier_removal == 0 {
            eyre::bail!("detector.min_cycles_for_outlier_removal must be >= 1");
        }

        if self.filter.prefilter_cutoff_hz <= 0.0 {
            eyre::bail!("filter.prefilter_cutoff_hz must be > 0");
        }
        if self.filter.transition_duration_s < 0.0 {
            eyre::bail!("filter.transition_duration_s must be >= 0");
        }
        for (name, hz) in [
            ("cutoff_standing_hz", self.filter.cutoff_standing_hz),
            ("cutoff_walking_hz", self.filter.cutoff_walking_hz),
            ("cutoff_stairs_hz", self.filter.cutoff_stairs_hz),
            ("cutoff_running_hz", self.filter.cutoff_running_hz),
            ("cutoff_jumping_hz", self.filter.cutoff_jumping_hz),
            ("cutoff_unknown_hz", self.filter.cutoff_unknown_hz),
        ] {
            if hz <= 0.0 {
                eyre::bail!("filter.{name} must be > 0");
            }
        }

        if self.detection.stairs_cadence_max <= self.detection.stairs_cadence_min {
            eyre::bail!("detection.stairs_cadence_max must exceed stairs_cadence_min");
        }
        if self.detection.walking_cadence_max <= self.detection.walking_cadence_min {
            eyre::bail!("detection.walking_cadence_max must exceed walking_cadence_min");
        }
        if self.detection.walking_sma_max <= self.detection.walking_sma_min {
            eyre::bail!("detection.walking_sma_max must exceed walking_sma_min");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_all_defaults() {
        let cfg = load_toml("").unwrap();
        assert_eq!(cfg.detector.min_step_duration_s, 0.5);
        assert_eq!(cfg.filter.prefilter_cutoff_hz, 20.0);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let toml_src = r#"
            [detector]
            outlier_zscore = 3.0
        "#;
        let cfg = load_toml(toml_src).unwrap();
        assert_eq!(cfg.detector.outlier_zscore, 3.0);
        assert_eq!(cfg.detector.min_step_duration_s, 0.5);
    }

    #[test]
    fn validate_rejects_inverted_step_duration_bounds() {
        let mut cfg = Config::default();
        cfg.detector.max_step_duration_s = cfg.detector.min_step_duration_s;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn session_metadata_rejects_implausible_height() {
        let meta = SessionMetadata {
            height_m: Some(12.0),
            ..Default::default()
        };
        assert!(meta.validate().is_err());
    }

    #[test]
    fn session_metadata_rejects_empty_session_id() {
        let meta = SessionMetadata {
            session_id: Some(String::new()),
            ..Default::default()
        };
        assert!(meta.validate().is_err());
    }

    #[test]
    fn calibration_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.json");
        let cal = DeviceCalibration {
            id: "device-1".into(),
            last_update: "2026-01-01".into(),
            sensor1: SensorCalibration::default(),
            sensor2: SensorCalibration::default(),
        };
        save_calibration_json(&path, &cal).unwrap();
        let loaded = load_calibration_json(&path).unwrap();
        assert_eq!(loaded.id, cal.id);
        assert_eq!(loaded.sensor1.acc_scale, cal.sensor1.acc_scale);
    }

    #[test]
    fn load_calibration_json_errors_on_missing_sensor_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.json");
        std::fs::write(&path, r#"{"id":"d","last_update":"2026-01-01","sensor1":{}}"#).unwrap();
        assert!(load_calibration_json(&path).is_err());
    }
}
