//! Shared data types passed between pipeline stages.
//!
//! Every inter-stage artifact is a fixed, explicitly-typed record — there is
//! no dictionary-of-unknown-shape on the hot path. Each stage owns the buffer
//! it produces and hands it, by value, to the next stage.

use std::fmt;

/// Fixed sampling rate of the instrumented sensors, in Hz.
pub const SAMPLE_RATE_HZ: f64 = 125.0;

/// Standard gravity, m/s^2, used throughout calibration and vertical-acc math.
pub const GRAVITY: f64 = 9.81;

/// A 3-vector of `f32`, used for both accelerometer (m/s^2) and gyroscope
/// (deg/s at input, rad/s once inside the orientation tracker) channels.
pub type Vec3 = [f32; 3];

/// One fused IMU reading from both sensors at a single instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub timestamp: f64,
    pub acc_thigh: Vec3,
    pub gyro_thigh: Vec3,
    pub acc_shank: Vec3,
    pub gyro_shank: Vec3,
}

impl SensorSample {
    pub fn zero(timestamp: f64) -> Self {
        Self {
            timestamp,
            acc_thigh: [0.0; 3],
            gyro_thigh: [0.0; 3],
            acc_shank: [0.0; 3],
            gyro_shank: [0.0; 3],
        }
    }
}

/// Per-physical-sensor calibration: bias/scale correction plus an optional
/// gravity-alignment rotation. Persisted per device id as a JSON blob
/// (see `gait_config::calibration`).
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCalibration {
    pub acc_bias: Vec3,
    pub acc_scale: Vec3,
    pub gyro_bias: Vec3,
    pub gyro_scale: Vec3,
    /// 3x3 row-major rotation applied after bias/scale correction. `None`
    /// means identity (gravity alignment has not run or was not persisted).
    pub rotation_matrix: Option<[[f32; 3]; 3]>,
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            acc_bias: [0.0; 3],
            acc_scale: [1.0; 3],
            gyro_bias: [0.0; 3],
            gyro_scale: [1.0; 3],
            rotation_matrix: None,
        }
    }
}

impl SensorCalibration {
    /// `acc_scale` must have no zero components; a zero scale factor would
    /// divide calibrated samples by zero.
    pub fn is_well_formed(&self) -> bool {
        self.acc_scale.iter().all(|s| s.abs() > f32::EPSILON)
    }
}

/// One physical device's calibration for both sensors, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCalibration {
    pub id: String,
    pub last_update: String,
    pub sensor1: SensorCalibration,
    pub sensor2: SensorCalibration,
}

/// The small fixed activity vocabulary the segmenter classifies into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Standing,
    Walking,
    Running,
    Jumping,
    Stairs,
    Unknown,
}

impl Activity {
    pub const ALL: [Activity; 6] = [
        Activity::Standing,
        Activity::Walking,
        Activity::Running,
        Activity::Jumping,
        Activity::Stairs,
        Activity::Unknown,
    ];
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Activity::Standing => "Standing",
            Activity::Walking => "Walking",
            Activity::Running => "Running",
            Activity::Jumping => "Jumping",
            Activity::Stairs => "Stairs",
            Activity::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

/// Per-window features extracted by the activity segmenter, kept on the
/// segment for downstream inspection/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActivityFeatures {
    pub sma_thigh: f64,
    pub sma_shank: f64,
    pub mag_mean_thigh: f64,
    pub mag_std_thigh: f64,
    pub mag_mean_shank: f64,
    pub mag_std_shank: f64,
    pub mag_ratio: f64,
    pub spectral_energy_thigh: f64,
    pub spectral_energy_shank: f64,
    pub dominant_freq_thigh: f64,
    pub dominant_freq_shank: f64,
    pub cadence: f64,
    pub peak_count_shank: usize,
    pub vertical_variance: f64,
}

/// A contiguous, classified stretch of the session timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySegment {
    pub activity: Activity,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub features: ActivityFeatures,
}

impl ActivitySegment {
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

/// One gait cycle: indices into the calibrated/filtered sample sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitCycle {
    pub hs_idx: usize,
    pub to_idx: usize,
    pub ms_idx: usize,
    pub next_hs_idx: usize,
    pub stride_time: f64,
    pub stance_time: f64,
    pub swing_time: f64,
    pub cadence: f64,
}

/// Per-cycle temporal and kinematic metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMetrics {
    pub step_index: usize,
    pub step_time: f64,
    pub stance_time: f64,
    pub swing_time: f64,
    pub stance_swing_ratio: f64,
    pub knee_flexion_max: f32,
    pub knee_extension_min: f32,
    pub knee_rom: f32,
    pub hip_max: f32,
    pub hip_min: f32,
    pub mean_roll_stance: f32,
    pub mean_pitch_stance: f32,
    pub mean_yaw_stance: f32,
    pub peak_angular_velocity: f32,
    pub impact_force: f32,
    pub knee_curve: [f32; 100],
}

/// Severity of a flagged anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

/// Anomaly kind: the three families the aggregator is contracted to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    SevereRomDrop,
    GaitArrhythmia,
    HighImpactSpike,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnomalyKind::SevereRomDrop => "Severe ROM Drop",
            AnomalyKind::GaitArrhythmia => "Gait Arrhythmia",
            AnomalyKind::HighImpactSpike => "High Impact Spike",
        };
        write!(f, "{s}")
    }
}

/// One flagged deviation at a specific step.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub step_index: usize,
    pub kind: AnomalyKind,
    pub metric: String,
    pub value: f64,
    pub typical_value: f64,
    pub severity: Severity,
}

/// Aggregate temporal/kinematic statistics, absent when no steps survive
/// artifact filtering (`AllStepsFiltered`).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAggregates {
    pub step_count: usize,
    pub mean_step_time: f64,
    pub mean_stance_time: f64,
    pub mean_swing_time: f64,
    pub stance_swing_ratio: f64,
    pub cadence: f64,
    pub knee_rom_mean: f64,
    pub knee_rom_std: f64,
    pub knee_curve_mean: [f32; 100],
    pub knee_curve_std: [f32; 100],
    pub hip_rom_mean: f64,
    pub hip_rom_std: f64,
    pub cv_step_time: f64,
    pub cv_stance_time: f64,
    pub cv_swing_time: f64,
    pub cv_knee_rom: f64,
    pub gvi: f64,
    pub speed_m_s: f64,
}

impl Default for SessionAggregates {
    fn default() -> Self {
        Self {
            step_count: 0,
            mean_step_time: 0.0,
            mean_stance_time: 0.0,
            mean_swing_time: 0.0,
            stance_swing_ratio: 0.0,
            cadence: 0.0,
            knee_rom_mean: 0.0,
            knee_rom_std: 0.0,
            knee_curve_mean: [0.0; 100],
            knee_curve_std: [0.0; 100],
            hip_rom_mean: 0.0,
            hip_rom_std: 0.0,
            cv_step_time: 0.0,
            cv_stance_time: 0.0,
            cv_swing_time: 0.0,
            cv_knee_rom: 0.0,
            gvi: 0.0,
            speed_m_s: 0.0,
        }
    }
}

/// Session-level metadata carried through from the external interface.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub start_time: Option<String>,
    pub height_m: Option<f64>,
    pub user_notes: Option<String>,
    pub is_baseline: bool,
}

/// The top-level pipeline output.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub meta: SessionMeta,
    pub duration_s: f64,
    pub segments: Vec<ActivitySegment>,
    pub activity_mix_s: Vec<(Activity, f64)>,
    pub aggregates: Option<SessionAggregates>,
    pub pathology_log: Vec<Anomaly>,
    pub warnings: Vec<String>,
    pub degenerate_cycle_count: usize,
}

impl SessionSummary {
    pub fn empty(meta: SessionMeta) -> Self {
        Self {
            meta,
            duration_s: 0.0,
            segments: Vec::new(),
            activity_mix_s: Vec::new(),
            aggregates: None,
            pathology_log: Vec::new(),
            warnings: Vec::new(),
            degenerate_cycle_count: 0,
        }
    }
}
