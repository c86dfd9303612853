//! Stage 5: activity-aware low-pass filtering with cross-faded blending.
//!
//! Grounded on the original `Filter` class: a per-activity Butterworth
//! low-pass cached by cutoff, combined through per-sample alpha masks with
//! cosine fade-in/fade-out at segment boundaries, a fallback to the Unknown
//! mask when total alpha collapses to ~0, and a final per-sample
//! normalization so all masks sum to 1.

use crate::filter::FilterCache;
use crate::types::{Activity, ActivitySegment, SensorSample, SAMPLE_RATE_HZ};

pub const DEFAULT_TRANSITION_DURATION_S: f64 = 0.5;
const ALPHA_EPSILON: f64 = 1e-6;

fn cutoff_for(activity: Activity) -> f64 {
    match activity {
        Activity::Standing => 2.0,
        Activity::Walking => 6.0,
        Activity::Stairs => 7.0,
        Activity::Running => 12.0,
        Activity::Jumping => 15.0,
        Activity::Unknown => 8.0,
    }
}

/// Blend activity-specific Butterworth low-pass outputs using per-segment
/// cosine-fade alpha masks. Sessions with no segments pass through
/// unmodified (there is nothing to blend against).
#[tracing::instrument(level = "debug", skip(samples, segments), fields(n = samples.len()))]
pub fn activity_aware_filter(
    samples: &[SensorSample],
    segments: &[ActivitySegment],
) -> Vec<SensorSample> {
    if samples.is_empty() || segments.is_empty() {
        return samples.to_vec();
    }

    let n = samples.len();
    let transition_samples =
        ((DEFAULT_TRANSITION_DURATION_S * SAMPLE_RATE_HZ).round() as usize).max(1);

    let mut present: Vec<Activity> = segments.iter().map(|s| s.activity).collect();
    present.sort_by_key(|a| *a as u8 as u32 + discriminant(a));
    present.dedup();
    if !present.contains(&Activity::Unknown) {
        present.push(Activity::Unknown);
    }

    let mut cache = FilterCache::new();
    let mut filtered: Vec<(Activity, Vec<SensorSample>)> = Vec::with_capacity(present.len());
    for &activity in &present {
        let sos = cache.get_or_design(cutoff_for(activity), SAMPLE_RATE_HZ);
        filtered.push((activity, filter_all_channels(samples, sos)));
    }

    let mut masks: Vec<(Activity, Vec<f64>)> = present
        .iter()
        .map(|&a| (a, vec![0.0f64; n]))
        .collect();

    for segment in segments {
        let start_idx = (segment.start_time * SAMPLE_RATE_HZ).round().max(0.0) as usize;
        let end_idx = ((segment.end_time * SAMPLE_RATE_HZ).round() as usize).min(n);
        if start_idx >= end_idx {
            continue;
        }
        if let Some((_, mask)) = masks.iter_mut().find(|(a, _)| *a == segment.activity) {
            apply_cosine_fade(mask, start_idx, end_idx, transition_samples);
        }
    }

    let mut total = vec![0.0f64; n];
    for (_, mask) in &masks {
        for i in 0..n {
            total[i] += mask[i];
        }
    }
    for i in 0..n {
        if total[i] < ALPHA_EPSILON {
            if let Some((_, unknown_mask)) = masks
                .iter_mut()
                .find(|(a, _)| *a == Activity::Unknown)
            {
                unknown_mask[i] = 1.0;
            }
        }
    }
    let mut total = vec![0.0f64; n];
    for (_, mask) in &masks {
        for i in 0..n {
            total[i] += mask[i];
        }
    }

    let mut out = samples.to_vec();
    for i in 0..n {
        let norm = if total[i] > ALPHA_EPSILON { total[i] } else { 1.0 };
        let mut acc_thigh = [0.0f64; 3];
        let mut gyro_thigh = [0.0f64; 3];
        let mut acc_shank = [0.0f64; 3];
        let mut gyro_shank = [0.0f64; 3];
        for (activity, mask) in &masks {
            let alpha = mask[i] / norm;
            if alpha <= 0.0 {
                continue;
            }
            let Some((_, fsamples)) = filtered.iter().find(|(a, _)| a == activity) else {
                continue;
            };
            let s = &fsamples[i];
            for c in 0..3 {
                acc_thigh[c] += alpha * s.acc_thigh[c] as f64;
                gyro_thigh[c] += alpha * s.gyro_thigh[c] as f64;
                acc_shank[c] += alpha * s.acc_shank[c] as f64;
                gyro_shank[c] += alpha * s.gyro_shank[c] as f64;
            }
        }
        out[i].acc_thigh = [acc_thigh[0] as f32, acc_thigh[1] as f32, acc_thigh[2] as f32];
        out[i].gyro_thigh = [gyro_thigh[0] as f32, gyro_thigh[1] as f32, gyro_thigh[2] as f32];
        out[i].acc_shank = [acc_shank[0] as f32, acc_shank[1] as f32, acc_shank[2] as f32];
        out[i].gyro_shank = [gyro_shank[0] as f32, gyro_shank[1] as f32, gyro_shank[2] as f32];
    }
    out
}

fn discriminant(a: &Activity) -> u32 {
    // Stable tiebreaker only; ordering among distinct activities doesn't
    // affect correctness, only cache/filter build order.
    match a {
        Activity::Standing => 0,
        Activity::Walking => 1,
        Activity::Running => 2,
        Activity::Jumping => 3,
        Activity::Stairs => 4,
        Activity::Unknown => 5,
    }
}

fn filter_all_channels(samples: &[SensorSample], sos: &crate::filter::Sos) -> Vec<SensorSample> {
    let pick_filter = |get: &dyn Fn(&SensorSample) -> [f32; 3]| -> Vec<[f32; 3]> {
        let mut axes: [Vec<f64>; 3] = [
            Vec::with_capacity(samples.len()),
            Vec::with_capacity(samples.len()),
            Vec::with_capacity(samples.len()),
        ];
        for s in samples {
            let v = get(s);
            for c in 0..3 {
                axes[c].push(v[c] as f64);
            }
        }
        let out: Vec<Vec<f64>> = axes.iter().map(|a| sos.filtfilt(a)).collect();
        (0..samples.len())
            .map(|i| [out[0][i] as f32, out[1][i] as f32, out[2][i] as f32])
            .collect()
    };

    let acc_thigh = pick_filter(&|s| s.acc_thigh);
    let gyro_thigh = pick_filter(&|s| s.gyro_thigh);
    let acc_shank = pick_filter(&|s| s.acc_shank);
    let gyro_shank = pick_filter(&|s| s.gyro_shank);

    samples
        .iter()
        .enumerate()
        .map(|(i, s)| SensorSample {
            timestamp: s.timestamp,
            acc_thigh: acc_thigh[i],
            gyro_thigh: gyro_thigh[i],
            acc_shank: acc_shank[i],
            gyro_shank: gyro_shank[i],
        })
        .collect()
}

/// Sets `mask[start..end]` to 1.0 with a cosine fade-in over the first
/// `transition` samples and a cosine fade-out over the last `transition`
/// samples of the segment (clamped so a short segment fades over its full
/// length rather than overshooting).
fn apply_cosine_fade(mask: &mut [f64], start: usize, end: usize, transition: usize) {
    let len = end - start;
    let half = (len / 2).max(1);
    let t = transition.min(half);
    for (offset, idx) in (start..end).enumerate() {
        let fade_in = if t > 0 && offset < t {
            0.5 * (1.0 - (std::f64::consts::PI * offset as f64 / t as f64).cos())
        } else {
            1.0
        };
        let dist_from_end = len - 1 - offset;
        let fade_out = if t > 0 && dist_from_end < t {
            0.5 * (1.0 - (std::f64::consts::PI * dist_from_end as f64 / t as f64).cos())
        } else {
            1.0
        };
        mask[idx] = fade_in.min(fade_out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityFeatures;

    fn flat_samples(n: usize) -> Vec<SensorSample> {
        (0..n)
            .map(|i| SensorSample {
                timestamp: i as f64 / SAMPLE_RATE_HZ,
                acc_thigh: [0.0, 0.0, 9.81],
                gyro_thigh: [0.0; 3],
                acc_shank: [0.0, 0.0, 9.81],
                gyro_shank: [0.0; 3],
            })
            .collect()
    }

    fn segment(activity: Activity, start: f64, end: f64) -> ActivitySegment {
        ActivitySegment {
            activity,
            start_time: start,
            end_time: end,
            confidence: 1.0,
            features: ActivityFeatures::default(),
        }
    }

    #[test]
    fn no_segments_passes_through() {
        let samples = flat_samples(100);
        let out = activity_aware_filter(&samples, &[]);
        assert_eq!(out.len(), samples.len());
    }

    #[test]
    fn masks_sum_to_one_everywhere() {
        let n = (6.0 * SAMPLE_RATE_HZ) as usize;
        let samples = flat_samples(n);
        let segments = vec![
            segment(Activity::Standing, 0.0, 3.0),
            segment(Activity::Walking, 3.0, 6.0),
        ];
        // Reconstruct internal masks via the same logic to check the
        // invariant directly (public API only returns the blended signal).
        let transition_samples = (DEFAULT_TRANSITION_DURATION_S * SAMPLE_RATE_HZ).round() as usize;
        let mut present: Vec<Activity> = segments.iter().map(|s| s.activity).collect();
        present.dedup();
        present.push(Activity::Unknown);
        let mut masks: Vec<Vec<f64>> = present.iter().map(|_| vec![0.0f64; n]).collect();
        for seg in &segments {
            let start_idx = (seg.start_time * SAMPLE_RATE_HZ).round() as usize;
            let end_idx = ((seg.end_time * SAMPLE_RATE_HZ).round() as usize).min(n);
            let idx = present.iter().position(|a| *a == seg.activity).unwrap();
            apply_cosine_fade(&mut masks[idx], start_idx, end_idx, transition_samples);
        }
        for i in 0..n {
            let total: f64 = masks.iter().map(|m| m[i]).sum();
            assert!(total > 0.0, "sample {i} has zero total alpha before fallback");
        }

        let out = activity_aware_filter(&samples, &segments);
        assert_eq!(out.len(), n);
    }
}
