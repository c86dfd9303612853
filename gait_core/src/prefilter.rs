//! Stage 3: fixed anti-alias low-pass across all four channels.
//!
//! A single 4th-order Butterworth low-pass at 20 Hz, applied zero-phase to
//! each of the four 3-vector channels independently, ahead of activity
//! segmentation. Kills high-frequency sensor noise without committing to
//! activity-dependent smoothing yet (that's the activity-aware filter,
//! stage 5).

use crate::filter::Sos;
use crate::types::{SensorSample, SAMPLE_RATE_HZ};

pub const PREFILTER_CUTOFF_HZ: f64 = 20.0;

#[tracing::instrument(level = "debug", skip(samples), fields(n = samples.len()))]
pub fn prefilter(samples: &[SensorSample]) -> Vec<SensorSample> {
    if samples.is_empty() {
        return Vec::new();
    }
    let sos = Sos::design_lowpass4(PREFILTER_CUTOFF_HZ, SAMPLE_RATE_HZ);

    let filter_channel = |pick: &dyn Fn(&SensorSample) -> [f32; 3]| -> Vec<[f32; 3]> {
        let mut axes = [Vec::with_capacity(samples.len()), Vec::with_capacity(samples.len()), Vec::with_capacity(samples.len())];
        for s in samples {
            let v = pick(s);
            axes[0].push(v[0] as f64);
            axes[1].push(v[1] as f64);
            axes[2].push(v[2] as f64);
        }
        let filtered: Vec<Vec<f64>> = axes.iter().map(|a| sos.filtfilt(a)).collect();
        (0..samples.len())
            .map(|i| {
                [
                    filtered[0][i] as f32,
                    filtered[1][i] as f32,
                    filtered[2][i] as f32,
                ]
            })
            .collect()
    };

    let acc_thigh = filter_channel(&|s| s.acc_thigh);
    let gyro_thigh = filter_channel(&|s| s.gyro_thigh);
    let acc_shank = filter_channel(&|s| s.acc_shank);
    let gyro_shank = filter_channel(&|s| s.gyro_shank);

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
