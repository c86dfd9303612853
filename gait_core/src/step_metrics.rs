//! Stage 8: per-cycle temporal and kinematic metrics.
//!
//! Grounded on the original `compute_step_metrics()`: temporal splits from
//! the cycle's HS/TO/next-HS indices, knee/hip range-of-motion from the
//! orientation trace over swing/stance, mean orientation during stance,
//! peak angular velocity, an impact-force proxy from the first samples
//! after heel strike, and a 100-point linearly-interpolated knee curve for
//! cross-cycle averaging. A cycle is rejected outright if its index
//! ordering is violated or it spans fewer than 10 samples.

use crate::orientation::OrientationTrace;
use crate::types::{GaitCycle, SensorSample, StepMetrics, SAMPLE_RATE_HZ};

const MIN_CYCLE_SAMPLES: usize = 10;
const IMPACT_WINDOW_SAMPLES: usize = 10;
const KNEE_CURVE_POINTS: usize = 100;

/// Compute per-step metrics for every structurally valid cycle. Cycles
/// failing the ordering/length sanity check are dropped (counted by the
/// caller via the length delta, same convention as the cycle detector).
#[tracing::instrument(level = "debug", skip(orientation, cycles), fields(n = cycles.len()))]
pub fn compute_step_metrics(orientation: &OrientationTrace, cycles: &[GaitCycle]) -> Vec<StepMetrics> {
    cycles
        .iter()
        .enumerate()
        .filter_map(|(i, c)| compute_one(i, orientation, c))
        .collect()
}

fn compute_one(step_index: usize, orientation: &OrientationTrace, c: &GaitCycle) -> Option<StepMetrics> {
    if !(c.hs_idx < c.to_idx && c.to_idx < c.ms_idx && c.ms_idx <= c.next_hs_idx) {
        return None;
    }
    if c.next_hs_idx - c.hs_idx < MIN_CYCLE_SAMPLES {
        return None;
    }

    let stance_swing_ratio = if c.swing_time > 0.0 {
        c.stance_time / c.swing_time
    } else {
        0.0
    };

    let knee_full = &orientation.knee_angle[c.hs_idx..c.next_hs_idx];
    let swing = &orientation.knee_angle[c.to_idx..c.next_hs_idx];
    let stance = &orientation.knee_angle[c.hs_idx..c.to_idx];

    let knee_flexion_max = max_of(swing).unwrap_or_else(|| max_of(knee_full).unwrap_or(0.0));
    let knee_extension_min = min_of(stance).unwrap_or_else(|| min_of(knee_full).unwrap_or(0.0));
    let knee_rom = knee_flexion_max - knee_extension_min;

    let hip_full = &orientation.thigh_pitch[c.hs_idx..c.next_hs_idx];
    let hip_max = max_of(hip_full).unwrap_or(0.0);
    let hip_min = min_of(hip_full).unwrap_or(0.0);

    let stance_range = c.hs_idx..c.to_idx;
    let mean_pitch_stance = mean_of(&orientation.shank_pitch[stance_range.clone()]);
    // Only sagittal-plane (pitch) orientation is tracked per sensor; roll and
    // yaw have no corresponding channel and are reported as zero.
    let mean_roll_stance = 0.0f32;
    let mean_yaw_stance = 0.0f64;

    let peak_angular_velocity = orientation.sagittal_gyro[c.hs_idx..c.next_hs_idx]
        .iter()
        .map(|v| v.abs())
        .fold(0.0f32, f32::max);

    let impact_end = (c.hs_idx + IMPACT_WINDOW_SAMPLES).min(orientation.vertical_acc.len());
    let impact_force = orientation.vertical_acc[c.hs_idx..impact_end]
        .iter()
        .map(|v| v.abs())
        .fold(0.0f32, f32::max);

    let knee_curve = interpolate_knee_curve(knee_full);

    Some(StepMetrics {
        step_index,
        step_time: c.stride_time,
        stance_time: c.stance_time,
        swing_time: c.swing_time,
        stance_swing_ratio,
        knee_flexion_max,
        knee_extension_min,
        knee_rom,
        hip_max,
        hip_min,
        mean_roll_stance,
        mean_pitch_stance: mean_pitch_stance as f32,
        mean_yaw_stance: mean_yaw_stance as f32,
        peak_angular_velocity,
        impact_force,
        knee_curve,
    })
}

fn max_of(xs: &[f32]) -> Option<f32> {
    xs.iter().cloned().fold(None, |acc, v| {
        Some(acc.map_or(v, |a: f32| a.max(v)))
    })
}

fn min_of(xs: &[f32]) -> Option<f32> {
    xs.iter().cloned().fold(None, |acc, v| {
        Some(acc.map_or(v, |a: f32| a.min(v)))
    })
}

fn mean_of(xs: &[f32]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().map(|&v| v as f64).sum::<f64>() / xs.len() as f64
}

/// Linearly interpolate `values` onto a fixed 100-point gait-cycle-percent
/// grid. A cycle shorter than the target resolution is upsampled the same
/// way; a single-sample cycle (degenerate, but structurally possible after
/// the length check above for `>= 10` samples never trips this) repeats
/// its one value.
fn interpolate_knee_curve(values: &[f32]) -> [f32; KNEE_CURVE_POINTS] {
    let mut out = [0.0f32; KNEE_CURVE_POINTS];
    if values.is_empty() {
        return out;
    }
    if values.len() == 1 {
        out.fill(values[0]);
        return out;
    }
    let last = values.len() - 1;
    for (i, slot) in out.iter_mut().enumerate() {
        let pos = i as f64 / (KNEE_CURVE_POINTS - 1) as f64 * last as f64;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(last);
        let frac = pos - lo as f64;
        let interpolated =
            values[lo] as f64 * (1.0 - frac) + values[hi] as f64 * frac;
        *slot = interpolated as f32;
    }
    out
}
