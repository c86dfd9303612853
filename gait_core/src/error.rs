//! Error taxonomy for the gait pipeline.
//!
//! Only `MalformedInput` and hard I/O/decode failures at the calibration-load
//! boundary produce an `Err`. Every other recoverable condition named in the
//! pipeline contract (empty signal, degenerate cycle, all-steps-filtered,
//! bad calibration) is folded into `SessionSummary` instead of raised: numeric
//! domain errors return 0 or null, never raise.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GaitError {
    #[error("malformed input: {reason} (byte offset {offset})")]
    MalformedInput { reason: String, offset: usize },

    #[error("bad calibration: {0}")]
    BadCalibration(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("calibration blob decode error: {0}")]
    Json(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_display_includes_offset() {
        let e = GaitError::MalformedInput {
            reason: "truncated trailing record".into(),
            offset: 610,
        };
        assert_eq!(
            e.to_string(),
            "malformed input: truncated trailing record (byte offset 610)"
        );
    }

    #[test]
    fn bad_calibration_display() {
        let e = GaitError::BadCalibration("missing six pose ranges".into());
        assert_eq!(e.to_string(), "bad calibration: missing six pose ranges");
    }
}
