//! Top-level orchestration: chains the nine pipeline stages and assembles
//! the final `SessionSummary`.
//!
//! Grounded on the original session-level `run()` entry point. Only a
//! `MalformedInput` from the unpacker aborts the session; every other
//! recoverable condition (bad calibration, empty signal, degenerate
//! cycles, all-steps-filtered) is folded into the summary per the error
//! taxonomy and never raised.

use crate::activity_filter::activity_aware_filter;
use crate::calibration::apply_calibration;
use crate::cycles::detect_cycles;
use crate::error::Result;
use crate::orientation::track_orientation;
use crate::prefilter::prefilter;
use crate::segmenter::segment_activity;
use crate::session::{activity_mix, aggregate, detect_anomalies, filter_artifacts};
use crate::step_metrics::compute_step_metrics;
use crate::types::{DeviceCalibration, SensorSample, SessionMeta, SessionSummary, SAMPLE_RATE_HZ};
use crate::unpacker::unpack;

/// Run the full nine-stage pipeline over a raw byte buffer.
///
/// Errors only on `MalformedInput` from the unpacker; everything else is
/// absorbed into the returned `SessionSummary`.
#[tracing::instrument(level = "info", skip(raw, calibration), fields(bytes = raw.len()))]
pub fn run_pipeline(
    raw: &[u8],
    calibration: Option<&DeviceCalibration>,
    meta: SessionMeta,
) -> Result<SessionSummary> {
    let samples = unpack(raw)?;

    if samples.is_empty() {
        return Ok(SessionSummary::empty(meta));
    }

    let mut warnings = Vec::new();

    let (thigh_cal, shank_cal) = match calibration {
        Some(cal) => (cal.sensor1.clone(), cal.sensor2.clone()),
        None => {
            warnings.push("no calibration supplied; using identity calibration".to_string());
            tracing::warn!("running session with identity calibration");
            (Default::default(), Default::default())
        }
    };

    if !thigh_cal.is_well_formed() || !shank_cal.is_well_formed() {
        warnings.push("degenerate calibration scale; falling back to identity".to_string());
        tracing::warn!("degenerate calibration scale, using identity fallback");
    }
    let thigh_cal = if thigh_cal.is_well_formed() {
        thigh_cal
    } else {
        Default::default()
    };
    let shank_cal = if shank_cal.is_well_formed() {
        shank_cal
    } else {
        Default::default()
    };

    let calibrated: Vec<SensorSample> = samples
        .iter()
        .map(|s| apply_calibration(s, &thigh_cal, &shank_cal))
        .collect();

    let prefiltered = prefilter(&calibrated);

    let duration_s = prefiltered.len() as f64 / SAMPLE_RATE_HZ;
    let segments = segment_activity(&prefiltered);

    let activity_filtered = activity_aware_filter(&prefiltered, &segments);

    let orientation = track_orientation(&activity_filtered);

    let (cycles, degenerate_from_detection) =
        detect_cycles(&orientation.sagittal_gyro, &orientation.vertical_acc, true);

    let all_steps = compute_step_metrics(&orientation, &cycles);
    let degenerate_cycle_count = degenerate_from_detection + (cycles.len() - all_steps.len());

    let filtered_steps = filter_artifacts(&all_steps);
    if !all_steps.is_empty() && filtered_steps.is_empty() {
        warnings.push("all steps filtered as artifacts".to_string());
        tracing::warn!("all steps filtered as artifacts");
    }

    let aggregates = aggregate(&filtered_steps, duration_s, meta.height_m);
    let pathology_log = detect_anomalies(&filtered_steps);
    let mix = activity_mix(&segments);

    Ok(SessionSummary {
        meta,
        duration_s,
        segments,
        activity_mix_s: mix,
        aggregates,
        pathology_log,
        warnings,
        degenerate_cycle_count,
    })
}
