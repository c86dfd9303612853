//! Stage 2: per-device bias/scale correction and gravity alignment.
//!
//! Grounded on the original implementation's `Calibrator` class: factory
//! calibration from six static poses, gravity alignment via the Rodrigues
//! rotation formula with two explicit singular cases, and a pure `apply`
//! that never mutates its input.

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::error::{GaitError, Result};
use crate::types::{SensorCalibration, SensorSample, Vec3, GRAVITY, SAMPLE_RATE_HZ};

/// Six static-pose index ranges, one per axis-up rest position, in the
/// order `+X, -X, +Y, -Y, +Z, -Z`.
pub type PoseRanges = [(usize, usize); 6];

/// Compute factory calibration (bias/scale) from six static-pose segments of
/// a raw sample stream for one sensor's accelerometer/gyro channels.
///
/// Fails with `GaitError::BadCalibration` if any range is empty; the caller
/// is responsible for supplying exactly six ranges (enforced by the
/// `PoseRanges` array type itself).
pub fn factory_calibration(
    samples: &[SensorSample],
    acc_of: impl Fn(&SensorSample) -> Vec3,
    gyro_of: impl Fn(&SensorSample) -> Vec3,
    ranges: &PoseRanges,
) -> Result<SensorCalibration> {
    for (start, end) in ranges {
        if start >= end || *end > samples.len() {
            return Err(GaitError::BadCalibration(format!(
                "pose range [{start}, {end}) is empty or out of bounds"
            ))
            .into());
        }
    }

    let mean_acc =
        |range: (usize, usize)| -> Vector3<f64> { mean_vec3(&samples[range.0..range.1], &acc_of) };
    let mean_gyro = |range: (usize, usize)| -> Vector3<f64> {
        mean_vec3(&samples[range.0..range.1], &gyro_of)
    };

    let pos_x = mean_acc(ranges[0]);
    let neg_x = mean_acc(ranges[1]);
    let pos_y = mean_acc(ranges[2]);
    let neg_y = mean_acc(ranges[3]);
    let pos_z = mean_acc(ranges[4]);
    let neg_z = mean_acc(ranges[5]);

    let acc_scale = Vector3::new(
        (pos_x.x - neg_x.x) / (2.0 * GRAVITY),
        (pos_y.y - neg_y.y) / (2.0 * GRAVITY),
        (pos_z.z - neg_z.z) / (2.0 * GRAVITY),
    );
    let acc_bias = Vector3::new(
        (pos_x.x + neg_x.x) / 2.0,
        (pos_y.y + neg_y.y) / 2.0,
        (pos_z.z + neg_z.z) / 2.0,
    );

    let mut gyro_sum = Vector3::zeros();
    for r in ranges {
        gyro_sum += mean_gyro(*r);
    }
    let gyro_bias = gyro_sum / 6.0;

    if acc_scale.iter().any(|s| s.abs() < 1e-9) {
        return Err(GaitError::BadCalibration(
            "degenerate accelerometer scale from factory poses".into(),
        )
        .into());
    }

    Ok(SensorCalibration {
        acc_bias: to_f32_arr(acc_bias),
        acc_scale: to_f32_arr(acc_scale),
        gyro_bias: to_f32_arr(gyro_bias),
        gyro_scale: [1.0; 3],
        rotation_matrix: None,
    })
}

/// Result of gravity alignment: the rotation to store in the calibration,
/// plus whether alignment actually converged (non-degenerate gravity vector).
pub struct GravityAlignment {
    pub rotation: Rotation3<f64>,
    pub converged: bool,
}

/// Estimate the rotation that sends the measured gravity direction (from the
/// first ~1.5s of session, bias/scale corrected only) to `(0, 0, -1)`.
///
/// Handles the two singular cases explicitly: already-aligned
/// (`cos(angle) > 0.9999`) returns identity; antiparallel
/// (`cos(angle) < -0.9999`) returns a 180-degree rotation about any axis
/// perpendicular to gravity. Otherwise uses the Rodrigues formula.
pub fn align_to_gravity(
    samples: &[SensorSample],
    acc_of: impl Fn(&SensorSample) -> Vec3,
    bias: Vec3,
    scale: Vec3,
) -> GravityAlignment {
    let n = ((1.5 * SAMPLE_RATE_HZ).round() as usize).min(samples.len());
    if n == 0 {
        return GravityAlignment {
            rotation: Rotation3::identity(),
            converged: false,
        };
    }

    let mut sum = Vector3::zeros();
    for s in &samples[..n] {
        let raw = acc_of(s);
        let corrected = Vector3::new(
            (raw[0] as f64 - bias[0] as f64) / scale[0] as f64,
            (raw[1] as f64 - bias[1] as f64) / scale[1] as f64,
            (raw[2] as f64 - bias[2] as f64) / scale[2] as f64,
        );
        sum += corrected;
    }
    let measured = sum / n as f64;
    let norm = measured.norm();
    if norm < 1e-9 {
        return GravityAlignment {
            rotation: Rotation3::identity(),
            converged: false,
        };
    }
    let measured_dir = measured / norm;
    let target = Vector3::new(0.0, 0.0, -1.0);

    let cos_angle = measured_dir.dot(&target).clamp(-1.0, 1.0);

    let rotation = if cos_angle > 0.9999 {
        Rotation3::identity()
    } else if cos_angle < -0.9999 {
        let perp = arbitrary_perpendicular(&measured_dir);
        Rotation3::from_axis_angle(&nalgebra::Unit::new_normalize(perp), std::f64::consts::PI)
    } else {
        let axis = measured_dir.cross(&target);
        let axis_norm = axis.norm();
        let angle = cos_angle.acos();
        Rotation3::from_axis_angle(&nalgebra::Unit::new_normalize(axis / axis_norm), angle)
    };

    GravityAlignment {
        rotation,
        converged: true,
    }
}

fn arbitrary_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let candidate = if v.x.abs() < 0.9 {
        Vector3::new(1.0, 0.0, 0.0)
    } else {
        Vector3::new(0.0, 1.0, 0.0)
    };
    candidate - v * v.dot(&candidate)
}

/// Apply a full calibration (bias/scale + optional rotation) to one sample.
/// Pure: the input is not mutated.
pub fn apply_calibration(
    sample: &SensorSample,
    thigh_cal: &SensorCalibration,
    shank_cal: &SensorCalibration,
) -> SensorSample {
    SensorSample {
        timestamp: sample.timestamp,
        acc_thigh: apply_one(
            sample.acc_thigh,
            thigh_cal.acc_bias,
            thigh_cal.acc_scale,
            thigh_cal.rotation_matrix,
        ),
        gyro_thigh: apply_one(
            sample.gyro_thigh,
            thigh_cal.gyro_bias,
            thigh_cal.gyro_scale,
            thigh_cal.rotation_matrix,
        ),
        acc_shank: apply_one(
            sample.acc_shank,
            shank_cal.acc_bias,
            shank_cal.acc_scale,
            shank_cal.rotation_matrix,
        ),
        gyro_shank: apply_one(
            sample.gyro_shank,
            shank_cal.gyro_bias,
            shank_cal.gyro_scale,
            shank_cal.rotation_matrix,
        ),
    }
}

fn apply_one(raw: Vec3, bias: Vec3, scale: Vec3, rotation: Option<[[f32; 3]; 3]>) -> Vec3 {
    let corrected = Vector3::new(
        (raw[0] - bias[0]) / scale[0],
        (raw[1] - bias[1]) / scale[1],
        (raw[2] - bias[2]) / scale[2],
    );
    let rotated = match rotation {
        Some(r) => {
            let m = Matrix3::new(
                r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
            );
            m * corrected
        }
        None => corrected,
    };
    [rotated.x, rotated.y, rotated.z]
}

fn mean_vec3(samples: &[SensorSample], f: &impl Fn(&SensorSample) -> Vec3) -> Vector3<f64> {
    let mut sum = Vector3::zeros();
    for s in samples {
        let v = f(s);
        sum += Vector3::new(v[0] as f64, v[1] as f64, v[2] as f64);
    }
    sum / samples.len() as f64
}

fn to_f32_arr(v: Vector3<f64>) -> Vec3 {
    [v.x as f32, v.y as f32, v.z as f32]
}
