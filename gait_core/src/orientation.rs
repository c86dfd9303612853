//! Stage 6: per-sensor Madgwick AHRS orientation tracking.
//!
//! Grounded on the original `orientation()` method: two independent Madgwick
//! filters (thigh, shank), Euler extraction with the standard pitch
//! singularity clamp, `knee_angle = thigh_pitch - shank_pitch`, sagittal
//! gyro axis chosen by max per-channel std across the session, and a
//! gravity-compensated vertical acceleration trace from the shank sensor.
//! Uses the `ahrs` crate's `Madgwick` filter (6-DOF `update_imu`) over
//! `nalgebra` vectors/quaternions, grounded in
//! `other_examples/46bf5756_druiz0992-imu-rs/ahrs-rs/mod.rs`.

use ahrs::{Ahrs, Madgwick};
use nalgebra::Vector3;

use crate::types::{SensorSample, SAMPLE_RATE_HZ};

const MADGWICK_BETA: f64 = 0.1;
const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Per-sample orientation outputs for the whole session.
#[derive(Debug, Clone)]
pub struct OrientationTrace {
    pub thigh_pitch: Vec<f32>,
    pub shank_pitch: Vec<f32>,
    pub knee_angle: Vec<f32>,
    pub vertical_acc: Vec<f32>,
    /// Index (0=x, 1=y, 2=z) of the shank gyro channel with maximum std
    /// across the whole session; robust to mount orientation.
    pub sagittal_axis: usize,
    /// The shank gyro channel at `sagittal_axis`, in deg/s (as input).
    pub sagittal_gyro: Vec<f32>,
}

#[tracing::instrument(level = "debug", skip(samples), fields(n = samples.len()))]
pub fn track_orientation(samples: &[SensorSample]) -> OrientationTrace {
    let n = samples.len();
    let dt = 1.0 / SAMPLE_RATE_HZ;

    let mut thigh_filter = Madgwick::new(dt, MADGWICK_BETA);
    let mut shank_filter = Madgwick::new(dt, MADGWICK_BETA);

    let mut thigh_pitch = Vec::with_capacity(n);
    let mut shank_pitch = Vec::with_capacity(n);
    let mut knee_angle = Vec::with_capacity(n);
    let mut vertical_acc = Vec::with_capacity(n);

    for s in samples {
        let gyro_thigh = Vector3::new(
            s.gyro_thigh[0] as f64 * DEG_TO_RAD,
            s.gyro_thigh[1] as f64 * DEG_TO_RAD,
            s.gyro_thigh[2] as f64 * DEG_TO_RAD,
        );
        let acc_thigh = Vector3::new(
            s.acc_thigh[0] as f64,
            s.acc_thigh[1] as f64,
            s.acc_thigh[2] as f64,
        );
        let gyro_shank = Vector3::new(
            s.gyro_shank[0] as f64 * DEG_TO_RAD,
            s.gyro_shank[1] as f64 * DEG_TO_RAD,
            s.gyro_shank[2] as f64 * DEG_TO_RAD,
        );
        let acc_shank = Vector3::new(
            s.acc_shank[0] as f64,
            s.acc_shank[1] as f64,
            s.acc_shank[2] as f64,
        );

        let q_thigh = thigh_filter
            .update_imu(&gyro_thigh, &acc_thigh)
            .cloned()
            .unwrap_or_else(|_| *thigh_filter.quat);
        let q_shank = shank_filter
            .update_imu(&gyro_shank, &acc_shank)
            .cloned()
            .unwrap_or_else(|_| *shank_filter.quat);

        let (_, p_thigh, _) = quaternion_to_euler(&q_thigh);
        let (_, p_shank, _) = quaternion_to_euler(&q_shank);

        thigh_pitch.push(p_thigh as f32);
        shank_pitch.push(p_shank as f32);
        knee_angle.push((p_thigh - p_shank) as f32);

        let world_acc = q_shank * acc_shank;
        vertical_acc.push((world_acc.z - crate::types::GRAVITY) as f32);
    }

    let sagittal_axis = select_sagittal_axis(samples);
    let sagittal_gyro: Vec<f32> = samples
        .iter()
        .map(|s| s.gyro_shank[sagittal_axis])
        .collect();

    OrientationTrace {
        thigh_pitch,
        shank_pitch,
        knee_angle,
        vertical_acc,
        sagittal_axis,
        sagittal_gyro,
    }
}

/// Roll, pitch, yaw (radians) from a unit quaternion, with the standard
/// singularity clamp at `|sin(pitch)| >= 1`.
fn quaternion_to_euler(q: &nalgebra::UnitQuaternion<f64>) -> (f64, f64, f64) {
    let w = q.quaternion().scalar();
    let v = q.quaternion().vector();
    let (x, y, z) = (v.x, v.y, v.z);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));

    let sinp = 2.0 * (w * y - z * x);
    let pitch = if sinp.abs() >= 1.0 {
        std::f64::consts::FRAC_PI_2.copysign(sinp)
    } else {
        sinp.asin()
    };

    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    (roll, pitch, yaw)
}

fn select_sagittal_axis(samples: &[SensorSample]) -> usize {
    if samples.is_empty() {
        return 0;
    }
    let mut sums = [0.0f64; 3];
    let mut sums_sq = [0.0f64; 3];
    let n = samples.len() as f64;
    for s in samples {
        for c in 0..3 {
            let v = s.gyro_shank[c] as f64;
            sums[c] += v;
            sums_sq[c] += v * v;
        }
    }
    let mut best_axis = 0;
    let mut best_std = -1.0;
    for c in 0..3 {
        let mean = sums[c] / n;
        let var = (sums_sq[c] / n - mean * mean).max(0.0);
        let std = var.sqrt();
        if std > best_std {
            best_std = std;
            best_axis = c;
        }
    }
    best_axis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_samples(n: usize) -> Vec<SensorSample> {
        (0..n)
            .map(|i| SensorSample {
                timestamp: i as f64 / SAMPLE_RATE_HZ,
                acc_thigh: [0.0, 0.0, -9.81],
                gyro_thigh: [0.0; 3],
                acc_shank: [0.0, 0.0, -9.81],
                gyro_shank: [0.0; 3],
            })
            .collect()
    }

    #[test]
    fn stationary_session_converges_to_near_zero_knee_angle() {
        let samples = flat_samples(500);
        let trace = track_orientation(&samples);
        let last = *trace.knee_angle.last().unwrap();
        assert!(last.abs() < 0.2, "knee angle did not converge: {last}");
    }

    #[test]
    fn sagittal_axis_picks_highest_variance_channel() {
        let samples: Vec<_> = (0..300)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE_HZ;
                let gy = 100.0 * (2.0 * std::f64::consts::PI * t).sin();
                SensorSample {
                    timestamp: t,
                    acc_thigh: [0.0, 0.0, -9.81],
                    gyro_thigh: [0.0; 3],
                    acc_shank: [0.0, 0.0, -9.81],
                    gyro_shank: [0.0, gy as f32, 0.0],
                }
            })
            .collect();
        let trace = track_orientation(&samples);
        assert_eq!(trace.sagittal_axis, 1);
    }

    #[test]
    fn one_sensor_zero_still_converges_knee_angle_is_negative_of_other_pitch() {
        let n = 500;
        let samples: Vec<_> = (0..n)
            .map(|i| SensorSample {
                timestamp: i as f64 / SAMPLE_RATE_HZ,
                acc_thigh: [1.0, 0.0, -9.5],
                gyro_thigh: [0.0, 0.0, 0.0],
                acc_shank: [0.0, 0.0, 0.0],
                gyro_shank: [0.0; 3],
            })
            .collect();
        let trace = track_orientation(&samples);
        let last_thigh = *trace.thigh_pitch.last().unwrap();
        let last_shank = *trace.shank_pitch.last().unwrap();
        let last_knee = *trace.knee_angle.last().unwrap();
        assert!((last_knee - (last_thigh - last_shank)).abs() < 1e-4);
        let _ = last_shank;
    }
}
