//! Stage 7: gait cycle detection from mid-swing peaks, with heel-strike and
//! toe-off refinement.
//!
//! Grounded on the original `StepDetector`: mid-swing peak finding on the
//! shank sagittal gyro, forward heel-strike search, backward toe-off search,
//! cycle assembly with duration bounds, and optional z-score outlier
//! removal. Peak finding has no corpus crate analogue and is a
//! straightforward hand-rolled implementation per the signal-processing
//! design note.

use crate::types::{GaitCycle, SAMPLE_RATE_HZ};

const MIN_STEP_DURATION_S: f64 = 0.5;
const MAX_STEP_DURATION_S: f64 = 2.5;
const MS_HEIGHT_STD_MULT: f64 = 1.5;
const MS_PROMINENCE_STD_MULT: f64 = 0.5;
const HS_SEARCH_WINDOW_S: f64 = 0.3;
const TO_SEARCH_WINDOW_S: f64 = 0.4;
const TO_PROMINENCE_STD_MULT: f64 = 0.2;
const OUTLIER_ZSCORE: f64 = 2.5;
const MIN_CYCLES_FOR_OUTLIER_REMOVAL: usize = 3;

/// Detect gait cycles from the shank sagittal gyro trace and the
/// gravity-compensated vertical acceleration trace. Both must be the same
/// length as the session. Degenerate cycles are silently dropped; the
/// caller should track how many via `len` deltas if it needs the count.
#[tracing::instrument(level = "debug", skip(sagittal_gyro, vertical_acc), fields(n = sagittal_gyro.len()))]
pub fn detect_cycles(
    sagittal_gyro: &[f32],
    vertical_acc: &[f32],
    remove_outliers: bool,
) -> (Vec<GaitCycle>, usize) {
    let n = sagittal_gyro.len();
    if n < 4 {
        return (Vec::new(), 0);
    }
    let gyro: Vec<f64> = sagittal_gyro.iter().map(|&v| v as f64).collect();
    let vacc: Vec<f64> = vertical_acc.iter().map(|&v| v as f64).collect();

    let (mean, std) = mean_std(&gyro);
    let min_sep = (MIN_STEP_DURATION_S * SAMPLE_RATE_HZ).round() as usize;
    let ms_peaks = find_peaks(
        &gyro,
        mean + MS_HEIGHT_STD_MULT * std,
        MS_PROMINENCE_STD_MULT * std,
        min_sep.max(1),
    );

    if ms_peaks.len() < 2 {
        return (Vec::new(), 0);
    }

    let hs_window = (HS_SEARCH_WINDOW_S * SAMPLE_RATE_HZ).round() as usize;
    let mut hs_candidates: Vec<usize> = ms_peaks
        .iter()
        .filter_map(|&ms| find_heel_strike(&gyro, &vacc, ms, hs_window))
        .collect();
    hs_candidates.sort_unstable();
    hs_candidates.dedup();

    if hs_candidates.len() < 2 {
        return (Vec::new(), 0);
    }

    let to_window = (TO_SEARCH_WINDOW_S * SAMPLE_RATE_HZ).round() as usize;
    let mut cycles = Vec::new();
    let mut degenerate = 0usize;

    for pair in hs_candidates.windows(2) {
        let (hs_idx, next_hs_idx) = (pair[0], pair[1]);
        let duration = (next_hs_idx - hs_idx) as f64 / SAMPLE_RATE_HZ;
        if !(MIN_STEP_DURATION_S..=MAX_STEP_DURATION_S).contains(&duration) {
            degenerate += 1;
            continue;
        }

        let ms_idx = ms_peaks
            .iter()
            .copied()
            .filter(|&ms| ms > hs_idx && ms <= next_hs_idx)
            .max_by(|&a, &b| gyro[a].total_cmp(&gyro[b]));

        let Some(ms_idx) = ms_idx else {
            degenerate += 1;
            continue;
        };

        let to_idx = find_toe_off(&gyro, std, hs_idx, ms_idx, to_window);

        let Some(to_idx) = to_idx else {
            degenerate += 1;
            continue;
        };

        if !(hs_idx < to_idx && to_idx < ms_idx && ms_idx <= next_hs_idx) {
            degenerate += 1;
            continue;
        }

        let stride_time = duration;
        let stance_time = (to_idx - hs_idx) as f64 / SAMPLE_RATE_HZ;
        let swing_time = (next_hs_idx - to_idx) as f64 / SAMPLE_RATE_HZ;
        let cadence = if stride_time > 0.0 { 60.0 / stride_time } else { 0.0 };

        cycles.push(GaitCycle {
            hs_idx,
            to_idx,
            ms_idx,
            next_hs_idx,
            stride_time,
            stance_time,
            swing_time,
            cadence,
        });
    }

    if remove_outliers && cycles.len() > MIN_CYCLES_FOR_OUTLIER_REMOVAL {
        let durations: Vec<f64> = cycles.iter().map(|c| c.stride_time).collect();
        let (mean_d, std_d) = mean_std(&durations);
        if std_d > 1e-9 {
            let before = cycles.len();
            cycles.retain(|c| ((c.stride_time - mean_d) / std_d).abs() < OUTLIER_ZSCORE);
            degenerate += before - cycles.len();
        }
    }

    (cycles, degenerate)
}

fn find_heel_strike(
    gyro: &[f64],
    vacc: &[f64],
    ms_idx: usize,
    window: usize,
) -> Option<usize> {
    let end = (ms_idx + window).min(gyro.len());
    if ms_idx + 1 >= end {
        return None;
    }
    // First negative-going zero crossing of the sagittal gyro.
    for i in ms_idx..end - 1 {
        if gyro[i] >= 0.0 && gyro[i + 1] < 0.0 {
            return Some(i + 1);
        }
    }
    // Fallback: first local minimum of vertical acceleration.
    for i in ms_idx + 1..end - 1 {
        if vacc[i] <= vacc[i - 1] && vacc[i] <= vacc[i + 1] {
            return Some(i);
        }
    }
    // Fallback: first negative index.
    (ms_idx..end).find(|&i| gyro[i] < 0.0)
}

fn find_toe_off(gyro: &[f64], std: f64, hs_idx: usize, ms_idx: usize, window: usize) -> Option<usize> {
    let start = ms_idx.saturating_sub(window).max(hs_idx);
    if start >= ms_idx {
        return None;
    }
    let slice = &gyro[start..ms_idx];

    // Most prominent minimum (value distance below the higher of its two
    // flanking maxima within the window) meeting the prominence threshold.
    let mut best: Option<(usize, f64)> = None;
    for i in 1..slice.len().saturating_sub(1) {
        if slice[i] <= slice[i - 1] && slice[i] <= slice[i + 1] {
            let left_max = slice[..i].iter().cloned().fold(f64::MIN, f64::max);
            let right_max = slice[i + 1..].iter().cloned().fold(f64::MIN, f64::max);
            let reference = left_max.max(right_max);
            let prominence = reference - slice[i];
            if prominence >= TO_PROMINENCE_STD_MULT * std {
                let score = prominence;
                if best.map(|(_, b)| score > b).unwrap_or(true) {
                    best = Some((start + i, score));
                }
            }
        }
    }
    if let Some((idx, _)) = best {
        return Some(idx);
    }

    // Fallback: the window's absolute minimum.
    slice
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| start + i)
}

/// Local-maxima peak finder with a height floor, a simplified prominence
/// measure (drop from the peak to the higher of its two flanking maxima
/// within the signal), and greedy minimum-separation enforcement.
fn find_peaks(signal: &[f64], height: f64, prominence: f64, min_separation: usize) -> Vec<usize> {
    let mut candidates: Vec<(usize, f64)> = Vec::new();
    for i in 1..signal.len().saturating_sub(1) {
        if signal[i] >= height && signal[i] >= signal[i - 1] && signal[i] >= signal[i + 1] {
            let left_min = signal[..i].iter().cloned().fold(f64::MAX, f64::min);
            let right_min = signal[i + 1..].iter().cloned().fold(f64::MAX, f64::min);
            let base = left_min.max(right_min).min(signal[i]);
            let prom = signal[i] - base;
            if prom >= prominence {
                candidates.push((i, signal[i]));
            }
        }
    }
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut chosen: Vec<usize> = Vec::new();
    for (idx, _) in candidates {
        if chosen.iter().all(|&c| idx.abs_diff(c) >= min_separation) {
            chosen.push(idx);
        }
    }
    chosen.sort_unstable();
    chosen
}

fn mean_std(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    (mean, var.sqrt())
}
