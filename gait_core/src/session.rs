//! Stage 9: artifact filtering, statistical aggregation, and anomaly
//! flagging over a session's per-step metrics.
//!
//! Grounded on the original `SessionAggregator`: a fixed-bound artifact
//! filter followed by an IQR pass, means/stds/CVs over the surviving
//! steps, a Gait Variability Index, a height-driven speed estimate, and
//! three fixed anomaly families compared against the session median.

use crate::types::{
    Activity, ActivitySegment, Anomaly, AnomalyKind, SessionAggregates, Severity, StepMetrics,
};

const MIN_STEP_TIME_S: f64 = 0.25;
const MAX_STEP_TIME_S: f64 = 2.5;
const IQR_MIN_STEPS: usize = 10;
const IQR_MULTIPLIER: f64 = 1.5;

const DEFAULT_LEG_LENGTH_M: f64 = 0.9;
const DEFAULT_BASE_STEP_LENGTH_M: f64 = 0.7;
const LEG_LENGTH_RATIO: f64 = 0.53;
const BASE_STEP_LENGTH_RATIO: f64 = 0.413;

const ROM_DROP_RATIO: f64 = 0.6;
const ARRHYTHMIA_LOW_RATIO: f64 = 0.5;
const ARRHYTHMIA_HIGH_RATIO: f64 = 1.5;
const IMPACT_SPIKE_THRESHOLD: f32 = 2.5;

/// Drop steps outside the fixed bound, then an IQR pass if enough remain.
/// Mirrors the original two-stage artifact filter: a hard physiological
/// bound first, a distributional bound second (only once there's enough
/// data for quartiles to be meaningful).
pub fn filter_artifacts(steps: &[StepMetrics]) -> Vec<StepMetrics> {
    let bounded: Vec<StepMetrics> = steps
        .iter()
        .filter(|s| (MIN_STEP_TIME_S..=MAX_STEP_TIME_S).contains(&s.step_time))
        .cloned()
        .collect();

    if bounded.len() < IQR_MIN_STEPS {
        return bounded;
    }

    let mut times: Vec<f64> = bounded.iter().map(|s| s.step_time).collect();
    times.sort_by(|a, b| a.total_cmp(b));
    let (q1, q3) = quartiles(&times);
    let iqr = q3 - q1;
    let lo = q1 - IQR_MULTIPLIER * iqr;
    let hi = q3 + IQR_MULTIPLIER * iqr;

    bounded
        .into_iter()
        .filter(|s| s.step_time >= lo && s.step_time <= hi)
        .collect()
}

/// Aggregate a filtered step list into `SessionAggregates`, or `None` if no
/// steps survived filtering (`AllStepsFiltered`, folded in per the error
/// taxonomy — not raised).
#[tracing::instrument(level = "debug", skip(steps), fields(n = steps.len()))]
pub fn aggregate(
    steps: &[StepMetrics],
    duration_s: f64,
    height_m: Option<f64>,
) -> Option<SessionAggregates> {
    if steps.is_empty() {
        return None;
    }

    let step_times: Vec<f64> = steps.iter().map(|s| s.step_time).collect();
    let stance_times: Vec<f64> = steps.iter().map(|s| s.stance_time).collect();
    let swing_times: Vec<f64> = steps.iter().map(|s| s.swing_time).collect();
    let knee_roms: Vec<f64> = steps.iter().map(|s| s.knee_rom as f64).collect();
    let hip_roms: Vec<f64> = steps.iter().map(|s| (s.hip_max - s.hip_min) as f64).collect();

    let mean_step_time = mean(&step_times);
    let mean_stance_time = mean(&stance_times);
    let mean_swing_time = mean(&swing_times);
    let stance_swing_ratio = if mean_swing_time > 0.0 {
        mean_stance_time / mean_swing_time
    } else {
        0.0
    };
    let cadence = if duration_s > 0.0 {
        steps.len() as f64 / duration_s * 60.0
    } else {
        0.0
    };

    let knee_rom_mean = mean(&knee_roms);
    let knee_rom_std = std_dev(&knee_roms, knee_rom_mean);
    let hip_rom_mean = mean(&hip_roms);
    let hip_rom_std = std_dev(&hip_roms, hip_rom_mean);

    let (knee_curve_mean, knee_curve_std) = aggregate_knee_curves(steps);

    let cv_step_time = coefficient_of_variation(&step_times);
    let cv_stance_time = coefficient_of_variation(&stance_times);
    let cv_swing_time = coefficient_of_variation(&swing_times);
    let cv_knee_rom = coefficient_of_variation(&knee_roms);

    let temporal_cvs = [cv_step_time, cv_stance_time, cv_swing_time];
    let positive: Vec<f64> = temporal_cvs.iter().copied().filter(|v| *v > 0.0).collect();
    let gvi = if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<f64>() / positive.len() as f64
    };

    let speed_m_s = estimate_speed(steps.len(), knee_rom_mean, duration_s, height_m);

    Some(SessionAggregates {
        step_count: steps.len(),
        mean_step_time,
        mean_stance_time,
        mean_swing_time,
        stance_swing_ratio,
        cadence,
        knee_rom_mean,
        knee_rom_std,
        knee_curve_mean,
        knee_curve_std,
        hip_rom_mean,
        hip_rom_std,
        cv_step_time,
        cv_stance_time,
        cv_swing_time,
        cv_knee_rom,
        gvi,
        speed_m_s,
    })
}

/// Estimate walking speed from step count, average knee ROM, and session
/// duration. `height_m` drives leg/step-length anthropometry when known;
/// otherwise fixed defaults are used (reproducible without subject data).
pub fn estimate_speed(
    step_count: usize,
    avg_knee_rom_deg: f64,
    duration_s: f64,
    height_m: Option<f64>,
) -> f64 {
    if duration_s <= 0.0 || step_count == 0 {
        return 0.0;
    }
    let (leg_length, base_step_length) = match height_m {
        Some(h) if h > 0.0 => (LEG_LENGTH_RATIO * h, BASE_STEP_LENGTH_RATIO * h),
        _ => (DEFAULT_LEG_LENGTH_M, DEFAULT_BASE_STEP_LENGTH_M),
    };
    let half_angle_rad = (avg_knee_rom_deg / 1.5 / 2.0).to_radians();
    let dynamic_step = 2.0 * leg_length * half_angle_rad.sin();
    let step_length = dynamic_step.max(0.8 * base_step_length);
    (step_count as f64 * step_length / duration_s).max(0.0)
}

/// Flag the three fixed anomaly families against the session median.
#[tracing::instrument(level = "debug", skip(steps), fields(n = steps.len()))]
pub fn detect_anomalies(steps: &[StepMetrics]) -> Vec<Anomaly> {
    if steps.is_empty() {
        return Vec::new();
    }

    let mut rom_sorted: Vec<f64> = steps.iter().map(|s| s.knee_rom as f64).collect();
    rom_sorted.sort_by(|a, b| a.total_cmp(b));
    let median_rom = median(&rom_sorted);

    let mut time_sorted: Vec<f64> = steps.iter().map(|s| s.step_time).collect();
    time_sorted.sort_by(|a, b| a.total_cmp(b));
    let median_time = median(&time_sorted);

    let mut anomalies = Vec::new();

    for s in steps {
        let rom = s.knee_rom as f64;
        if median_rom > 0.0 && rom < ROM_DROP_RATIO * median_rom {
            anomalies.push(Anomaly {
                step_index: s.step_index,
                kind: AnomalyKind::SevereRomDrop,
                metric: "knee_rom".into(),
                value: rom,
                typical_value: median_rom,
                severity: Severity::Critical,
            });
            tracing::warn!(step_index = s.step_index, value = rom, typical = median_rom, "severe ROM drop");
        }

        if median_time > 0.0
            && (s.step_time < ARRHYTHMIA_LOW_RATIO * median_time
                || s.step_time > ARRHYTHMIA_HIGH_RATIO * median_time)
        {
            anomalies.push(Anomaly {
                step_index: s.step_index,
                kind: AnomalyKind::GaitArrhythmia,
                metric: "step_time".into(),
                value: s.step_time,
                typical_value: median_time,
                severity: Severity::Warning,
            });
            tracing::warn!(step_index = s.step_index, value = s.step_time, typical = median_time, "gait arrhythmia");
        }

        if s.impact_force > IMPACT_SPIKE_THRESHOLD {
            anomalies.push(Anomaly {
                step_index: s.step_index,
                kind: AnomalyKind::HighImpactSpike,
                metric: "impact_force".into(),
                value: s.impact_force as f64,
                typical_value: IMPACT_SPIKE_THRESHOLD as f64,
                severity: Severity::Warning,
            });
            tracing::warn!(step_index = s.step_index, value = s.impact_force, "high impact spike");
        }
    }

    anomalies
}

/// Reduce segments into a per-activity total-duration map, coalescing
/// repeated activities across non-adjacent segments (§4.9.7 rollup).
pub fn activity_mix(segments: &[ActivitySegment]) -> Vec<(Activity, f64)> {
    let mut mix: Vec<(Activity, f64)> = Vec::new();
    for seg in segments {
        match mix.iter_mut().find(|(a, _)| *a == seg.activity) {
            Some((_, total)) => *total += seg.duration(),
            None => mix.push((seg.activity, seg.duration())),
        }
    }
    mix
}

fn aggregate_knee_curves(steps: &[StepMetrics]) -> ([f32; 100], [f32; 100]) {
    let mut mean_curve = [0.0f32; 100];
    let mut std_curve = [0.0f32; 100];
    let n = steps.len() as f64;
    for i in 0..100 {
        let values: Vec<f64> = steps.iter().map(|s| s.knee_curve[i] as f64).collect();
        let m = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
        mean_curve[i] = m as f32;
        std_curve[i] = var.sqrt() as f32;
    }
    (mean_curve, std_curve)
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn std_dev(xs: &[f64], mean_val: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let var = xs.iter().map(|v| (v - mean_val).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

fn coefficient_of_variation(xs: &[f64]) -> f64 {
    let m = mean(xs);
    if m.abs() < 1e-12 {
        return 0.0;
    }
    100.0 * std_dev(xs, m) / m
}

fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn quartiles(sorted: &[f64]) -> (f64, f64) {
    let n = sorted.len();
    let lower = &sorted[..n / 2];
    let upper = if n % 2 == 0 {
        &sorted[n / 2..]
    } else {
        &sorted[n / 2 + 1..]
    };
    (median(lower), median(upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityFeatures;

    fn step(step_index: usize, step_time: f64, knee_rom: f32, impact: f32) -> StepMetrics {
        StepMetrics {
            step_index,
            step_time,
            stance_time: step_time * 0.4,
            swing_time: step_time * 0.6,
            stance_swing_ratio: 0.4 / 0.6,
            knee_flexion_max: knee_rom,
            knee_extension_min: 0.0,
            knee_rom,
            hip_max: 10.0,
            hip_min: -5.0,
            mean_roll_stance: 0.0,
            mean_pitch_stance: 0.0,
            mean_yaw_stance: 0.0,
            peak_angular_velocity: 100.0,
            impact_force: impact,
            knee_curve: [knee_rom / 2.0; 100],
        }
    }

    #[test]
    fn filter_artifacts_drops_out_of_bound_step_times() {
        let steps = vec![step(0, 0.1, 40.0, 1.0), step(1, 1.0, 40.0, 1.0)];
        let out = filter_artifacts(&steps);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].step_index, 1);
    }

    #[test]
    fn aggregate_returns_none_for_empty_steps() {
        assert!(aggregate(&[], 10.0, None).is_none());
    }

    #[test]
    fn gvi_is_mean_of_positive_temporal_cvs() {
        let steps: Vec<_> = (0..12)
            .map(|i| step(i, 1.0 + 0.05 * (i as f64 % 3.0), 40.0, 1.0))
            .collect();
        let agg = aggregate(&steps, 20.0, None).unwrap();
        assert!(agg.gvi >= 0.0);
        assert!(agg.cv_step_time >= 0.0);
    }

    #[test]
    fn detects_severe_rom_drop() {
        let mut steps: Vec<_> = (0..5).map(|i| step(i, 1.0, 40.0, 1.0)).collect();
        steps.push(step(5, 1.0, 10.0, 1.0));
        let anomalies = detect_anomalies(&steps);
        assert!(anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::SevereRomDrop && a.step_index == 5));
    }

    #[test]
    fn detects_high_impact_spike() {
        let steps = vec![step(0, 1.0, 40.0, 1.0), step(1, 1.0, 40.0, 3.0)];
        let anomalies = detect_anomalies(&steps);
        assert!(anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::HighImpactSpike && a.step_index == 1));
    }

    #[test]
    fn aggregate_threads_height_into_speed() {
        let steps: Vec<_> = (0..12).map(|i| step(i, 1.0, 40.0, 1.0)).collect();
        let default_agg = aggregate(&steps, 20.0, None).unwrap();
        let tall_agg = aggregate(&steps, 20.0, Some(2.0)).unwrap();
        assert!(
            (tall_agg.speed_m_s - default_agg.speed_m_s).abs() > 1e-6,
            "height should change the speed estimate: {} vs {}",
            default_agg.speed_m_s,
            tall_agg.speed_m_s
        );
    }

    #[test]
    fn speed_uses_defaults_when_height_unset() {
        let speed = estimate_speed(60, 45.0, 60.0, None);
        assert!(speed >= 0.0);
        let with_height = estimate_speed(60, 45.0, 60.0, Some(1.7));
        assert!(with_height >= 0.0);
    }
}
