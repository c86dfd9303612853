//! Stage 4: window the signal, extract features, classify each window into
//! an activity, then merge adjacent same-label windows into segments.
//!
//! Grounded on the original `ActivityDetector`: windowing loop, feature
//! extraction (SMA, magnitude stats, Hann-windowed FFT spectral features,
//! cadence, peak count, vertical variance), the prioritized classification
//! cascade, and segment merging.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::types::{Activity, ActivityFeatures, ActivitySegment, SensorSample, GRAVITY, SAMPLE_RATE_HZ};

const WINDOW_DURATION_S: f64 = 2.0;
const OVERLAP_S: f64 = 0.5;
const SPECTRAL_BAND_HZ: (f64, f64) = (0.5, 5.0);
const PEAK_THRESHOLD_FACTOR: f64 = 2.5;
const PEAK_MIN_SEPARATION_S: f64 = 0.2;

/// Windows the session and classifies each window, then merges adjacent
/// same-label windows. Sessions shorter than one window yield no segments.
#[tracing::instrument(level = "debug", skip(samples), fields(n = samples.len()))]
pub fn segment_activity(samples: &[SensorSample]) -> Vec<ActivitySegment> {
    let window_samples = (WINDOW_DURATION_S * SAMPLE_RATE_HZ).round() as usize;
    let hop_samples = ((WINDOW_DURATION_S - OVERLAP_S) * SAMPLE_RATE_HZ).round() as usize;
    if samples.len() < window_samples || window_samples == 0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        if start + window_samples > samples.len() {
            break;
        }
        let window = &samples[start..start + window_samples];
        let features = extract_features(window);
        let (activity, confidence) = classify(&features);

        let start_time = samples[start].timestamp;
        let is_last = start + hop_samples + window_samples > samples.len();
        let end_time = if is_last {
            samples[samples.len() - 1].timestamp + 1.0 / SAMPLE_RATE_HZ
        } else {
            samples[(start + hop_samples).min(samples.len() - 1)].timestamp
        };

        windows.push(ActivitySegment {
            activity,
            start_time,
            end_time,
            confidence,
            features,
        });

        start += hop_samples;
    }

    merge_segments(windows)
}

fn merge_segments(windows: Vec<ActivitySegment>) -> Vec<ActivitySegment> {
    let mut merged: Vec<ActivitySegment> = Vec::new();
    for w in windows {
        match merged.last_mut() {
            Some(last) if last.activity == w.activity => {
                last.end_time = w.end_time;
                last.confidence = (last.confidence + w.confidence) / 2.0;
            }
            _ => merged.push(w),
        }
    }
    merged
}

fn extract_features(window: &[SensorSample]) -> ActivityFeatures {
    let n = window.len();
    let acc_thigh: Vec<[f64; 3]> = window
        .iter()
        .map(|s| [s.acc_thigh[0] as f64, s.acc_thigh[1] as f64, s.acc_thigh[2] as f64])
        .collect();
    let acc_shank: Vec<[f64; 3]> = window
        .iter()
        .map(|s| [s.acc_shank[0] as f64, s.acc_shank[1] as f64, s.acc_shank[2] as f64])
        .collect();

    let sma_thigh = sma(&acc_thigh);
    let sma_shank = sma(&acc_shank);

    let mag_thigh: Vec<f64> = acc_thigh.iter().map(|v| norm3(v)).collect();
    let mag_shank: Vec<f64> = acc_shank.iter().map(|v| norm3(v)).collect();

    let mag_mean_thigh = mean(&mag_thigh);
    let mag_std_thigh = std_dev(&mag_thigh, mag_mean_thigh);
    let mag_mean_shank = mean(&mag_shank);
    let mag_std_shank = std_dev(&mag_shank, mag_mean_shank);

    let mag_ratio = mag_mean_shank / (mag_mean_thigh + 1e-9);

    let (spectral_energy_thigh, dominant_freq_thigh) = spectral_features(&mag_thigh);
    let (spectral_energy_shank, dominant_freq_shank) = spectral_features(&mag_shank);

    let cadence = dominant_freq_shank * 120.0;

    let peak_count_shank = count_peaks(
        &mag_shank,
        PEAK_THRESHOLD_FACTOR * GRAVITY,
        (PEAK_MIN_SEPARATION_S * SAMPLE_RATE_HZ).round() as usize,
    );

    let vertical_z: Vec<f64> = acc_shank.iter().map(|v| v[2]).collect();
    let vz_mean = mean(&vertical_z);
    let vertical_variance = variance(&vertical_z, vz_mean);

    debug_assert_eq!(n, window.len());

    ActivityFeatures {
        sma_thigh,
        sma_shank,
        mag_mean_thigh,
        mag_std_thigh,
        mag_mean_shank,
        mag_std_shank,
        mag_ratio,
        spectral_energy_thigh,
        spectral_energy_shank,
        dominant_freq_thigh,
        dominant_freq_shank,
        cadence,
        peak_count_shank,
        vertical_variance,
    }
}

fn sma(acc: &[[f64; 3]]) -> f64 {
    if acc.is_empty() {
        return 0.0;
    }
    let sum: f64 = acc
        .iter()
        .map(|v| v[0].abs() + v[1].abs() + v[2].abs())
        .sum();
    sum / acc.len() as f64
}

fn norm3(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn variance(xs: &[f64], mean_val: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().map(|v| (v - mean_val).powi(2)).sum::<f64>() / xs.len() as f64
}

fn std_dev(xs: &[f64], mean_val: f64) -> f64 {
    variance(xs, mean_val).sqrt()
}

/// Hann-windowed FFT over the magnitude signal, returning (spectral energy,
/// dominant frequency) within [`SPECTRAL_BAND_HZ`].
fn spectral_features(signal: &[f64]) -> (f64, f64) {
    let n = signal.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean_val = mean(signal);
    let hann: Vec<f64> = (0..n)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n as f64 - 1.0).max(1.0)).cos()
        })
        .collect();

    let mut buf: Vec<Complex64> = signal
        .iter()
        .zip(hann.iter())
        .map(|(&v, &w)| Complex64::new((v - mean_val) * w, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buf);

    let mut energy = 0.0;
    let mut best_power = 0.0;
    let mut dominant_freq = 0.0;
    for (k, c) in buf.iter().enumerate().take(n / 2 + 1) {
        let freq = k as f64 * SAMPLE_RATE_HZ / n as f64;
        if freq >= SPECTRAL_BAND_HZ.0 && freq <= SPECTRAL_BAND_HZ.1 {
            let power = c.norm_sqr();
            energy += power;
            if power > best_power {
                best_power = power;
                dominant_freq = freq;
            }
        }
    }
    (energy, dominant_freq)
}

fn count_peaks(signal: &[f64], threshold: f64, min_separation: usize) -> usize {
    let mut count = 0;
    let mut last_peak: Option<usize> = None;
    for i in 1..signal.len().saturating_sub(1) {
        if signal[i] > threshold && signal[i] >= signal[i - 1] && signal[i] >= signal[i + 1] {
            let far_enough = match last_peak {
                Some(p) => i - p >= min_separation,
                None => true,
            };
            if far_enough {
                count += 1;
                last_peak = Some(i);
            }
        }
    }
    count
}

/// Prioritized classification cascade: first match wins. Confidence formulas
/// are deterministic and pinned so tests can assert on them directly.
fn classify(f: &ActivityFeatures) -> (Activity, f64) {
    if f.peak_count_shank >= 3 && f.vertical_variance >= 5.0 && f.mag_std_shank > 0.9 {
        let c = 0.5
            + 0.25 * clamp01((f.peak_count_shank as f64 - 3.0) / 3.0)
            + 0.25 * clamp01((f.vertical_variance - 5.0) / 10.0);
        return (Activity::Jumping, c);
    }
    if f.sma_shank <= 0.5 && f.mag_std_shank <= 0.3 {
        let c = 0.6 + 0.4 * clamp01((0.5 - f.sma_shank) / 0.5);
        return (Activity::Standing, c);
    }
    if f.sma_shank >= 3.0 && f.cadence >= 140.0 && f.spectral_energy_shank >= 50.0 {
        let c = 0.5
            + 0.25 * clamp01((f.sma_shank - 3.0) / 3.0)
            + 0.25 * clamp01((f.cadence - 140.0) / 40.0);
        return (Activity::Running, c);
    }
    if f.mag_ratio >= 1.3 && (60.0..=100.0).contains(&f.cadence) && f.sma_shank >= 1.0 {
        let c = 0.5 + 0.5 * clamp01(1.0 - (f.cadence - 80.0).abs() / 20.0);
        return (Activity::Stairs, c);
    }
    if (0.5..=3.0).contains(&f.sma_shank)
        && (80.0..=140.0).contains(&f.cadence)
        && f.spectral_energy_shank < 50.0
    {
        let c = 0.5 + 0.5 * clamp01(1.0 - (f.cadence - 110.0).abs() / 30.0);
        return (Activity::Walking, c);
    }
    (Activity::Unknown, 0.3)
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}
